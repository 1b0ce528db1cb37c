//! Well-known role name constants carried in credentials.

pub const ROLE_ADMIN: &str = "ADMINISTRADOR";
pub const ROLE_AGENT: &str = "AGENTE";
