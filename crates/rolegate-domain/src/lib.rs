//! rolegate-domain: Core role-based enforcement logic
//!
//! This crate contains the core authorization logic including:
//! - Filter grammar and condition evaluation
//! - Nested write payload parsing
//! - Role-indexed permission catalog with caching
//! - Operation enforcement (checks, injection, existence verification)
//! - Role schema projection (deny-list derivation)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               rolegate-domain                │
//! ├─────────────────────────────────────────────┤
//! │  catalog     - Model & input-shape catalogs │
//! │  filter      - Filter grammar & evaluation  │
//! │  payload     - Nested write payloads        │
//! │  policy      - Permission records           │
//! │  perms       - Cached permission catalog    │
//! │  engine/     - Enforcement walk & rewrite   │
//! │  projection  - Role schema deny-lists       │
//! └─────────────────────────────────────────────┘
//! ```

pub mod catalog;
pub mod engine;
pub mod error;
pub mod filter;
pub mod payload;
pub mod perms;
pub mod policy;
pub mod projection;
pub mod session;

// Re-export commonly used types at the crate root
pub use catalog::{FieldDef, FieldKind, InputCatalog, InputKind, ModelCatalog, ModelDef};
pub use engine::{
    Candidate, Enforcer, EnforcerConfig, Operation, OperationContext, RowCounter, SelectTree, Walk,
};
pub use error::{DomainError, DomainResult};
pub use filter::{merge_check_with_where, FilterExpr, Selector};
pub use payload::{RelationWrite, WritePayload};
pub use perms::{CatalogConfig, PermissionCatalog, PermissionSource};
pub use policy::{PermType, PermissionDefinition, PermissionRecord};
pub use projection::{role_schema_filters, RoleSchemaFilters, RootFieldAnnotation};
pub use session::{Session, SessionContext};
