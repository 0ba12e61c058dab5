pub mod actor;
pub mod breadcrumb;
pub mod ride;
