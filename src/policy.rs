//! Policy documents (§3) and the in-memory bundle that indexes them (§2
//! component 4).

pub mod index;
pub mod types;

pub use index::{PolicyCounts, PolicyIndex};
pub use types::{
    DerivedRolesPolicy, Metadata, PrincipalActionRule, PrincipalPolicy, PrincipalRule,
    ResourcePolicy, ResourceRule,
};
