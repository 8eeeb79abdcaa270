mod behaviour;
pub(crate) mod support;
