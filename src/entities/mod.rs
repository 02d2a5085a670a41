//! SeaORM entities backing the remote document store.

pub mod document;

pub use document::{
    ActiveModel as DocumentActiveModel, Column as DocumentColumn, Entity as Document,
    Model as DocumentModel,
};
