/*!
 * # Permissions Module
 *
 * Permissions are `(module, action)` pairs rendered as `module:action`.
 * Users carry a list of raw tokens; each token is one of:
 *
 * - `module:action`: a single permission
 * - `module-full`: every action on one module
 * - `all`: every permission
 * - anything else: a legacy token, resolved through [`LEGACY_ALIASES`]
 *
 * The admin role is always allowed, whatever its tokens.
 */

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use strum::IntoEnumIterator;

use crate::models::UserRole;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Module {
    Dashboard,
    Orders,
    Customers,
    Products,
    Users,
    Reports,
    Settings,
    Calendar,
    Production,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    View,
    Create,
    Edit,
    Delete,
    Export,
    Manage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Permission {
    pub module: Module,
    pub action: Action,
}

impl Permission {
    pub const fn new(module: Module, action: Action) -> Self {
        Self { module, action }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.action)
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (module, action) = s
            .split_once(':')
            .ok_or_else(|| format!("'{}' is not a module:action permission", s))?;
        let module = Module::from_str(module).map_err(|_| format!("unknown module '{}'", module))?;
        let action = Action::from_str(action).map_err(|_| format!("unknown action '{}'", action))?;
        Ok(Self { module, action })
    }
}

/// One stored permission token, parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PermissionToken {
    Scoped(Permission),
    Full(Module),
    All,
    Legacy(String),
}

impl PermissionToken {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == "all" {
            return Self::All;
        }
        if let Some(module) = raw.strip_suffix("-full") {
            if let Ok(module) = Module::from_str(module) {
                return Self::Full(module);
            }
        }
        match Permission::from_str(raw) {
            Ok(permission) => Self::Scoped(permission),
            Err(_) => Self::Legacy(raw.to_string()),
        }
    }
}

impl fmt::Display for PermissionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scoped(p) => write!(f, "{}", p),
            Self::Full(m) => write!(f, "{}-full", m),
            Self::All => f.write_str("all"),
            Self::Legacy(raw) => f.write_str(raw),
        }
    }
}

lazy_static! {
    /// Tokens from earlier releases and the permissions they still grant.
    pub static ref LEGACY_ALIASES: HashMap<String, Vec<Permission>> = {
        let mut aliases: HashMap<String, Vec<Permission>> = HashMap::new();

        for module in Module::iter() {
            aliases.insert(format!("{}:read", module), vec![Permission::new(module, Action::View)]);
            aliases.insert(format!("{}:list", module), vec![Permission::new(module, Action::View)]);
            aliases.insert(
                format!("{}:write", module),
                vec![Permission::new(module, Action::Create), Permission::new(module, Action::Edit)],
            );
            aliases.insert(format!("{}:update", module), vec![Permission::new(module, Action::Edit)]);
            aliases.insert(format!("{}:remove", module), vec![Permission::new(module, Action::Delete)]);
            aliases.insert(format!("{}:*", module), Action::iter().map(|a| Permission::new(module, a)).collect());
            aliases.insert(format!("view_{}", module), vec![Permission::new(module, Action::View)]);
            aliases.insert(format!("manage_{}", module), Action::iter().map(|a| Permission::new(module, a)).collect());
        }

        aliases.insert("reports:download".to_string(), vec![Permission::new(Module::Reports, Action::Export)]);
        aliases.insert("orders:cancel".to_string(), vec![Permission::new(Module::Orders, Action::Edit)]);
        aliases.insert("orders:status".to_string(), vec![Permission::new(Module::Orders, Action::Edit)]);
        aliases.insert("production:update".to_string(), vec![
            Permission::new(Module::Production, Action::Edit),
            Permission::new(Module::Orders, Action::View),
        ]);

        aliases
    };

    /// Tokens given to new users of each role when none are supplied.
    pub static ref ROLE_DEFAULTS: HashMap<UserRole, Vec<&'static str>> = {
        let mut roles = HashMap::new();
        roles.insert(UserRole::Admin, vec!["all"]);
        roles.insert(UserRole::Seller, vec![
            "dashboard:view",
            "orders:view",
            "orders:create",
            "orders:edit",
            "customers-full",
            "products:view",
            "calendar:view",
            "reports:view",
            "reports:export",
        ]);
        roles.insert(UserRole::Operator, vec![
            "dashboard:view",
            "orders:view",
            "calendar:view",
            "production-full",
        ]);
        roles
    };
}

/// Default token list for a role.
pub fn default_tokens(role: UserRole) -> Vec<String> {
    ROLE_DEFAULTS
        .get(&role)
        .map(|tokens| tokens.iter().map(|t| t.to_string()).collect())
        .unwrap_or_default()
}

/// The permissions a user actually holds.
#[derive(Debug, Clone)]
pub struct PermissionSet {
    role: UserRole,
    tokens: Vec<PermissionToken>,
}

impl PermissionSet {
    pub fn new<S: AsRef<str>>(role: UserRole, raw_tokens: &[S]) -> Self {
        Self {
            role,
            tokens: raw_tokens
                .iter()
                .map(|t| PermissionToken::parse(t.as_ref()))
                .collect(),
        }
    }

    pub fn role(&self) -> UserRole {
        self.role
    }

    pub fn tokens(&self) -> &[PermissionToken] {
        &self.tokens
    }

    pub fn allows(&self, required: Permission) -> bool {
        if self.role == UserRole::Admin {
            return true;
        }
        if self.tokens.contains(&PermissionToken::Scoped(required)) {
            return true;
        }
        if self.tokens.contains(&PermissionToken::Full(required.module)) {
            return true;
        }
        if self.tokens.contains(&PermissionToken::All) {
            return true;
        }
        self.tokens.iter().any(|token| match token {
            PermissionToken::Legacy(raw) => LEGACY_ALIASES
                .get(raw)
                .map(|granted| granted.contains(&required))
                .unwrap_or(false),
            _ => false,
        })
    }
}
