pub(crate) mod bootstrap;
pub(crate) mod gameplay;
pub(crate) mod launcher;
pub(crate) mod settings;
