pub(crate) mod assistant;
pub(crate) mod health;
pub(crate) mod market;
