mod environment;
pub use environment::{
    DEFAULT_MAP_SIZE, DEFAULT_MAX_READERS, Environment, EnvironmentBuilder, Info, MIN_MAP_SIZE,
    Stat,
};

mod paths;

pub(crate) mod writer;
