use crate::{db, distribution, image_gen, tg};
use serde::de::DeserializeOwned;

pub struct Config {
    pub(crate) db: db::Config,
    pub(crate) tg: tg::Config,
    pub(crate) distribution: distribution::Config,
    pub(crate) buttons: distribution::ButtonsConfig,
    pub(crate) image_gen: image_gen::Config,
}

impl Config {
    pub fn load_or_panic() -> Config {
        Self {
            db: from_env_or_panic("DATABASE_"),
            tg: from_env_or_panic("TG_"),
            distribution: from_env_or_panic("DISTRIBUTION_"),
            buttons: from_env_or_panic("BUTTONS_"),
            image_gen: from_env_or_panic("IMAGE_GEN_"),
        }
    }
}

pub(crate) fn from_env_or_panic<T: DeserializeOwned>(prefix: &str) -> T {
    envy::prefixed(prefix).from_env().unwrap_or_else(|err| {
        panic!(
            "BUG: Couldn't load config from environment for {}: {:#?}",
            std::any::type_name::<T>(),
            err
        );
    })
}
