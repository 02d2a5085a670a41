use std::{fs, path::PathBuf, process::ExitCode, str::FromStr, sync::Arc};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use prodboard::{
    auth::Session,
    backup::BackupDocument,
    config::{self, AppConfig},
    errors::ServiceError,
    events::{process_events, LoggingHandler},
    models::{Customer, FragmentStatus, Order, OrderStatus, Priority, Product, User, UserRole},
    reports::{self, OrderFilter},
    services::{
        users::NewUser, FragmentSpec, FragmentUpdate, NewOrder, NewOrderItem, SettingsScope,
        TransitionOptions,
    },
    AppContext,
};

const DEFAULT_DATA_DIR: &str = ".prodboard";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<ServiceError>() {
                Some(service_err) => eprintln!("error: {}", service_err.response_message()),
                None => eprintln!("error: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let context = CliContext::initialize(cli.data_dir).await?;
    let json = cli.json;

    match cli.command {
        Commands::Init(args) => handle_init(&context, args, json).await,
        Commands::Login(args) => {
            let session = context.app.sessions.sign_in(&args.email).await?;
            render_session(&session, json)
        }
        Commands::Logout => {
            context.app.sessions.sign_out().await?;
            println!("Signed out");
            Ok(())
        }
        Commands::Whoami => {
            let session = context.session().await?;
            render_session(&session, json)
        }
        Commands::Orders(command) => handle_orders_command(&context, command, json).await,
        Commands::Customers(command) => handle_customers_command(&context, command, json).await,
        Commands::Products(command) => handle_products_command(&context, command, json).await,
        Commands::Users(command) => handle_users_command(&context, command, json).await,
        Commands::Settings(command) => handle_settings_command(&context, command).await,
        Commands::Report(command) => handle_report_command(&context, command, json).await,
        Commands::Backup(command) => handle_backup_command(&context, command).await,
    }
}

#[derive(Parser)]
#[command(name = "prodboard", about = "Production dashboard for orders, customers and products", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[arg(long, global = true, help = "Directory of the local data cache")]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the first administrator and sign in as them
    Init(InitArgs),
    Login(LoginArgs),
    Logout,
    Whoami,
    #[command(subcommand)]
    Orders(OrdersCommands),
    #[command(subcommand)]
    Customers(CustomersCommands),
    #[command(subcommand)]
    Products(ProductsCommands),
    #[command(subcommand)]
    Users(UsersCommands),
    #[command(subcommand)]
    Settings(SettingsCommands),
    #[command(subcommand)]
    Report(ReportCommands),
    #[command(subcommand)]
    Backup(BackupCommands),
}

#[derive(Args)]
struct InitArgs {
    #[arg(long)]
    email: String,
    #[arg(long)]
    name: String,
}

#[derive(Args)]
struct LoginArgs {
    email: String,
}

#[derive(Subcommand)]
enum OrdersCommands {
    List(OrderFilterArgs),
    Show {
        id: String,
    },
    Create(CreateOrderArgs),
    /// Move an order to another status
    Status {
        id: String,
        status: OrderStatus,
        #[arg(long)]
        operator: Option<String>,
    },
    Cancel {
        id: String,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        code: Option<String>,
    },
    Delete {
        id: String,
    },
    /// Split an order into production fragments (QTY@YYYY-MM-DD); no
    /// fragment clears the split
    Fragments {
        id: String,
        #[arg(long = "fragment", value_parser = parse_fragment)]
        fragments: Vec<FragmentSpec>,
    },
    /// Report progress on one fragment
    Fragment {
        id: String,
        number: u32,
        #[arg(long)]
        status: Option<FragmentStatus>,
        #[arg(long)]
        progress: Option<i64>,
        #[arg(long)]
        operator: Option<String>,
    },
}

#[derive(Args, Default)]
struct OrderFilterArgs {
    #[arg(long)]
    status: Option<OrderStatus>,
    #[arg(long)]
    priority: Option<Priority>,
    #[arg(long)]
    seller: Option<String>,
    #[arg(long)]
    search: Option<String>,
}

impl From<OrderFilterArgs> for OrderFilter {
    fn from(args: OrderFilterArgs) -> Self {
        OrderFilter {
            status: args.status,
            priority: args.priority,
            seller_id: args.seller,
            search: args.search,
        }
    }
}

#[derive(Args)]
struct CreateOrderArgs {
    #[arg(long)]
    customer: String,
    /// PRODUCT_ID:QTY[:UNIT_PRICE]
    #[arg(long = "item", required = true, value_parser = parse_order_item)]
    items: Vec<NewOrderItem>,
    #[arg(long, default_value_t = Priority::Medium)]
    priority: Priority,
    #[arg(long, value_parser = parse_date)]
    scheduled: Option<DateTime<Utc>>,
    #[arg(long, value_parser = parse_date)]
    delivery: Option<DateTime<Utc>>,
    #[arg(long)]
    operator: Option<String>,
    #[arg(long)]
    notes: Option<String>,
    #[arg(long, action = ArgAction::SetTrue)]
    awaiting_approval: bool,
}

#[derive(Subcommand)]
enum CustomersCommands {
    List {
        #[arg(long)]
        search: Option<String>,
    },
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        document: Option<String>,
        #[arg(long)]
        city: Option<String>,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand)]
enum ProductsCommands {
    List {
        #[arg(long, action = ArgAction::SetTrue)]
        active: bool,
    },
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        sku: String,
        #[arg(long, value_parser = parse_decimal)]
        price: Decimal,
        #[arg(long, value_parser = parse_decimal)]
        cost: Option<Decimal>,
        #[arg(long)]
        category: Option<String>,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand)]
enum UsersCommands {
    List,
    Add {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value_t = UserRole::Seller)]
        role: UserRole,
        /// Permission tokens; defaults to the role's standard set
        #[arg(long = "permission")]
        permissions: Vec<String>,
    },
    /// Replace a user's permission tokens
    Permissions {
        id: String,
        tokens: Vec<String>,
    },
    Activate {
        id: String,
    },
    Deactivate {
        id: String,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    Get {
        scope: SettingsScope,
    },
    /// Merge a JSON object into the stored settings
    Set {
        scope: SettingsScope,
        value: String,
        #[arg(long, action = ArgAction::SetTrue, help = "Replace instead of merging")]
        replace: bool,
    },
}

#[derive(Subcommand)]
enum ReportCommands {
    Csv {
        #[command(flatten)]
        filter: OrderFilterArgs,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    Summary,
    Calendar {
        #[arg(long, value_parser = parse_naive_date)]
        from: NaiveDate,
        #[arg(long, value_parser = parse_naive_date)]
        to: NaiveDate,
    },
}

#[derive(Subcommand)]
enum BackupCommands {
    Export {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    Restore {
        path: PathBuf,
    },
}

struct CliContext {
    app: AppContext,
}

impl CliContext {
    async fn initialize(data_dir: Option<PathBuf>) -> Result<Self> {
        let mut config: AppConfig =
            config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        if let Some(dir) = data_dir {
            config.local_dir = Some(dir.to_string_lossy().into_owned());
        } else if config.local_dir.is_none() {
            config.local_dir = Some(DEFAULT_DATA_DIR.to_string());
        }

        let app = AppContext::initialize(config)
            .await
            .context("failed to open the data store")?;

        tokio::spawn(process_events(
            app.events.subscribe(),
            Arc::new(LoggingHandler),
        ));

        Ok(Self { app })
    }

    async fn session(&self) -> Result<Session> {
        Ok(self
            .app
            .sessions
            .current_user()
            .await?
            .ok_or(ServiceError::Unauthenticated)?)
    }
}

async fn handle_init(context: &CliContext, args: InitArgs, json: bool) -> Result<()> {
    let admin = context
        .app
        .users
        .bootstrap_admin(&args.email, &args.name)
        .await?;
    let session = context.app.sessions.sign_in(&admin.email).await?;
    if !json {
        println!("Administrator {} created", admin.email);
    }
    render_session(&session, json)
}

async fn handle_orders_command(
    context: &CliContext,
    command: OrdersCommands,
    json: bool,
) -> Result<()> {
    let session = context.session().await?;
    let service = &context.app.orders;

    match command {
        OrdersCommands::List(args) => {
            let orders = service.list_orders(&session).await?;
            let filter: OrderFilter = args.into();
            let visible = filter.apply(&orders);
            if json {
                print_json(&visible)?;
            } else if visible.is_empty() {
                println!("No orders");
            } else {
                for order in visible {
                    render_order(order);
                }
            }
        }
        OrdersCommands::Show { id } => {
            let order = service.get_order(&id).await?;
            if json {
                print_json(&order)?;
            } else {
                render_order_detail(&order);
            }
        }
        OrdersCommands::Create(args) => {
            let input = NewOrder {
                customer_id: args.customer,
                items: args.items,
                priority: args.priority,
                scheduled_date: args.scheduled,
                delivery_date: args.delivery,
                assigned_operator: normalize_optional_string(args.operator),
                notes: normalize_optional_string(args.notes),
                awaiting_approval: args.awaiting_approval,
            };
            let order = service.create_order(input, &session).await?;
            if json {
                print_json(&order)?;
            } else {
                println!("Created {}", order.order_number);
                render_order_detail(&order);
            }
        }
        OrdersCommands::Status {
            id,
            status,
            operator,
        } => {
            let opts = TransitionOptions {
                operator: operator.or_else(|| Some(session.name.clone())),
                ..Default::default()
            };
            let order = service.transition(&id, status, opts, &session).await?;
            if json {
                print_json(&order)?;
            } else {
                render_order(&order);
            }
        }
        OrdersCommands::Cancel { id, reason, code } => {
            let mut opts = TransitionOptions::cancel(reason);
            opts.cancel_code = code;
            opts.operator = Some(session.name.clone());
            let order = service
                .transition(&id, OrderStatus::Cancelled, opts, &session)
                .await?;
            if json {
                print_json(&order)?;
            } else {
                render_order(&order);
            }
        }
        OrdersCommands::Delete { id } => {
            if service.delete_order(&id, &session).await? {
                println!("Order {} deleted", id);
            } else {
                return Err(anyhow!("order {} could not be deleted", id));
            }
        }
        OrdersCommands::Fragments { id, fragments } => {
            let order = context
                .app
                .fragments
                .allocate(&id, fragments, &session)
                .await?;
            if json {
                print_json(&order)?;
            } else {
                render_order_detail(&order);
            }
        }
        OrdersCommands::Fragment {
            id,
            number,
            status,
            progress,
            operator,
        } => {
            let update = FragmentUpdate {
                status,
                progress,
                operator: operator.or_else(|| Some(session.name.clone())),
            };
            let order = context
                .app
                .fragments
                .update_fragment(&id, number, update, &session)
                .await?;
            if json {
                print_json(&order)?;
            } else {
                render_order_detail(&order);
            }
        }
    }
    Ok(())
}

async fn handle_customers_command(
    context: &CliContext,
    command: CustomersCommands,
    json: bool,
) -> Result<()> {
    let session = context.session().await?;
    let service = &context.app.customers;

    match command {
        CustomersCommands::List { search } => {
            let customers = match search {
                Some(term) => service.search(&term, &session).await?,
                None => service.list_customers(&session).await?,
            };
            if json {
                print_json(&customers)?;
            } else {
                customers.iter().for_each(render_customer);
            }
        }
        CustomersCommands::Add {
            name,
            email,
            phone,
            document,
            city,
        } => {
            let mut customer = Customer::new(normalize_string(name));
            customer.email = normalize_optional_string(email);
            customer.phone = normalize_optional_string(phone);
            customer.document = normalize_optional_string(document);
            customer.city = normalize_optional_string(city);
            let created = service.create_customer(customer, &session).await?;
            if json {
                print_json(&created)?;
            } else {
                render_customer(&created);
            }
        }
        CustomersCommands::Delete { id } => {
            if !service.delete_customer(&id, &session).await? {
                return Err(anyhow!("customer {} could not be deleted", id));
            }
            println!("Customer {} deleted", id);
        }
    }
    Ok(())
}

async fn handle_products_command(
    context: &CliContext,
    command: ProductsCommands,
    json: bool,
) -> Result<()> {
    let session = context.session().await?;
    let service = &context.app.products;

    match command {
        ProductsCommands::List { active } => {
            let products = if active {
                service.list_active(&session).await?
            } else {
                service.list_products(&session).await?
            };
            if json {
                print_json(&products)?;
            } else {
                products.iter().for_each(render_product);
            }
        }
        ProductsCommands::Add {
            name,
            sku,
            price,
            cost,
            category,
        } => {
            let mut product = Product::new(normalize_string(name), normalize_string(sku), price);
            product.cost_price = cost.unwrap_or_default();
            product.category = normalize_optional_string(category);
            let created = service.create_product(product, &session).await?;
            if json {
                print_json(&created)?;
            } else {
                render_product(&created);
            }
        }
        ProductsCommands::Delete { id } => {
            if !service.delete_product(&id, &session).await? {
                return Err(anyhow!("product {} could not be deleted", id));
            }
            println!("Product {} deleted", id);
        }
    }
    Ok(())
}

async fn handle_users_command(
    context: &CliContext,
    command: UsersCommands,
    json: bool,
) -> Result<()> {
    let session = context.session().await?;
    let service = &context.app.users;

    let user = match command {
        UsersCommands::List => {
            let users = service.list_users(&session).await?;
            if json {
                print_json(&users)?;
            } else {
                users.iter().for_each(render_user);
            }
            return Ok(());
        }
        UsersCommands::Add {
            email,
            name,
            role,
            permissions,
        } => {
            let input = NewUser {
                email,
                name: normalize_string(name),
                role,
                permissions,
            };
            service.create_user(input, &session).await?
        }
        UsersCommands::Permissions { id, tokens } => {
            service.set_permissions(&id, tokens, &session).await?
        }
        UsersCommands::Activate { id } => service.set_active(&id, true, &session).await?,
        UsersCommands::Deactivate { id } => service.set_active(&id, false, &session).await?,
        UsersCommands::Delete { id } => {
            if !service.delete_user(&id, &session).await? {
                return Err(anyhow!("user {} could not be deleted", id));
            }
            println!("User {} deleted", id);
            return Ok(());
        }
    };

    if json {
        print_json(&user)?;
    } else {
        render_user(&user);
    }
    Ok(())
}

async fn handle_settings_command(context: &CliContext, command: SettingsCommands) -> Result<()> {
    let service = &context.app.settings;
    let value = match command {
        SettingsCommands::Get { scope } => service.get(scope).await?,
        SettingsCommands::Set {
            scope,
            value,
            replace,
        } => {
            let session = context.session().await?;
            let parsed: Value =
                serde_json::from_str(&value).context("settings value must be valid JSON")?;
            if replace {
                service.put(scope, parsed, &session).await?
            } else {
                service.merge(scope, parsed, &session).await?
            }
        }
    };
    print_json(&value)
}

async fn handle_report_command(
    context: &CliContext,
    command: ReportCommands,
    json: bool,
) -> Result<()> {
    use prodboard::auth::{Action, Module, Permission};

    let session = context.session().await?;
    let orders = context.app.orders.list_orders(&session).await?;

    match command {
        ReportCommands::Csv { filter, output } => {
            session.require(Permission::new(Module::Reports, Action::Export))?;
            let filter: OrderFilter = filter.into();
            let csv = reports::orders_to_csv(filter.apply(&orders));
            match output {
                Some(path) => {
                    fs::write(&path, csv)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Report written to {}", path.display());
                }
                None => println!("{}", csv),
            }
        }
        ReportCommands::Summary => {
            session.require(Permission::new(Module::Dashboard, Action::View))?;
            let summary = reports::summarize(&orders, Utc::now());
            if json {
                print_json(&summary)?;
            } else {
                println!("Orders: {}", summary.total_orders);
                for (status, count) in &summary.by_status {
                    let label = OrderStatus::from_str(status)
                        .map(|s| s.label())
                        .unwrap_or(status.as_str());
                    println!("  {}: {}", label, count);
                }
                println!("In progress: {}", summary.in_progress);
                println!("Revenue: {}", reports::format_money(summary.revenue));
                if !summary.overdue.is_empty() {
                    println!("Overdue: {}", summary.overdue.join(", "));
                }
            }
        }
        ReportCommands::Calendar { from, to } => {
            session.require(Permission::new(Module::Calendar, Action::View))?;
            if to < from {
                return Err(anyhow!("--to must not be before --from"));
            }
            let days = reports::calendar(&orders, from, to);
            if json {
                print_json(&days)?;
            } else {
                for (day, entries) in &days {
                    println!("{}", day.format("%d/%m/%Y"));
                    for entry in entries {
                        let part = entry
                            .fragment_number
                            .map(|n| format!(" (parte {})", n))
                            .unwrap_or_default();
                        println!(
                            "  - {}{} • {} • {} un • {}",
                            entry.order_number,
                            part,
                            entry.customer_name,
                            entry.quantity,
                            entry.status.label()
                        );
                    }
                }
            }
        }
    }
    Ok(())
}

async fn handle_backup_command(context: &CliContext, command: BackupCommands) -> Result<()> {
    let session = context.session().await?;
    let service = &context.app.backup;

    match command {
        BackupCommands::Export { output } => {
            let doc = service.export(&session).await?;
            let body = doc.to_json()?;
            match output {
                Some(path) => {
                    fs::write(&path, body)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Backup written to {}", path.display());
                }
                None => println!("{}", body),
            }
        }
        BackupCommands::Restore { path } => {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let doc = BackupDocument::from_json(&raw)?;
            let report = service.restore(&doc, &session).await?;
            println!(
                "Restored {} users, {} customers, {} products, {} orders",
                report.users, report.customers, report.products, report.orders
            );
        }
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_session(session: &Session, json: bool) -> Result<()> {
    if json {
        return print_json(session);
    }
    println!(
        "Signed in as {} <{}> • role {} • {} permission(s)",
        session.name,
        session.email,
        session.role,
        session.permissions.len()
    );
    Ok(())
}

fn render_order(order: &Order) {
    println!(
        "- {} • {} • {} • {} • {} • {}%",
        order.order_number,
        order.customer_name,
        order.status.label(),
        order.priority.label(),
        reports::format_money(order.total_amount),
        order.production_progress
    );
}

fn render_order_detail(order: &Order) {
    render_order(order);
    println!("  id {} • seller {}", order.id, order.seller_name);
    for line in &order.products {
        println!(
            "  • {} x {} @ {} (total {})",
            line.quantity,
            line.product_name,
            reports::format_money(line.unit_price),
            reports::format_money(line.total_price)
        );
    }
    for fragment in &order.fragments {
        println!(
            "  # {} • {} un • {} • {} • {}%",
            fragment.fragment_number,
            fragment.quantity,
            fragment.scheduled_date.format("%d/%m/%Y"),
            fragment.status,
            fragment.progress
        );
    }
    if let Some(cancellation) = &order.cancellation {
        println!("  cancelled: {}", cancellation.reason);
    }
}

fn render_customer(customer: &Customer) {
    println!(
        "- {} • {} • {}",
        customer.id,
        customer.name,
        customer.email.as_deref().unwrap_or("-")
    );
}

fn render_product(product: &Product) {
    println!(
        "- {} • {} • SKU {} • {} • {}",
        product.id,
        product.name,
        product.sku,
        reports::format_money(product.base_price),
        product.status
    );
}

fn render_user(user: &User) {
    let state = if user.active { "active" } else { "inactive" };
    println!(
        "- {} • {} <{}> • {} • {}",
        user.id, user.name, user.email, user.role, state
    );
}

fn normalize_string(value: String) -> String {
    value.trim().to_string()
}

fn normalize_optional_string(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_order_item(raw: &str) -> Result<NewOrderItem, String> {
    let mut parts = raw.split(':').map(str::trim);
    let product_id = parts
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| format!("invalid item '{raw}', expected PRODUCT_ID:QTY[:PRICE]"))?;
    let quantity: i64 = parts
        .next()
        .ok_or_else(|| format!("item '{raw}' is missing a quantity"))?
        .parse()
        .map_err(|_| format!("invalid quantity in '{raw}'"))?;
    if quantity <= 0 {
        return Err("quantity must be positive".to_string());
    }
    let unit_price = parts.next().map(parse_decimal).transpose()?;
    if parts.next().is_some() {
        return Err(format!("invalid item '{raw}', expected PRODUCT_ID:QTY[:PRICE]"));
    }
    Ok(NewOrderItem::new(product_id, quantity, unit_price))
}

fn parse_fragment(raw: &str) -> Result<FragmentSpec, String> {
    let (quantity, date) = raw
        .split_once('@')
        .ok_or_else(|| format!("invalid fragment '{raw}', expected QTY@YYYY-MM-DD"))?;
    let quantity: i64 = quantity
        .trim()
        .parse()
        .map_err(|_| format!("invalid quantity in '{raw}'"))?;
    Ok(FragmentSpec::new(quantity, parse_date(date.trim())?))
}

fn parse_decimal(raw: &str) -> Result<Decimal, String> {
    Decimal::from_str(raw.replace(',', ".").as_str()).map_err(|_| format!("invalid decimal '{raw}'"))
}

fn parse_naive_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
        .map_err(|_| format!("invalid date '{raw}', expected YYYY-MM-DD"))
}

/// Accepts RFC 3339 timestamps or plain dates (noon UTC).
fn parse_date(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    parse_naive_date(raw)?
        .and_hms_opt(12, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("invalid date '{raw}'"))
}
