pub(crate) mod errors;
pub(crate) mod evaluate;
pub(crate) mod handlers;
pub(crate) mod router;
