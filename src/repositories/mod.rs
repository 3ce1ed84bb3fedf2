pub(crate) mod results;
