use serde::Deserialize;

#[derive(Deserialize)]
pub(crate) struct Config {
    pub(crate) url: url::Url,

    #[serde(default = "default_database_pool_size")]
    pub(crate) pool_size: u32,
}

fn default_database_pool_size() -> u32 {
    // Every admitted channel holds a connection with its spam gate lock
    // until the send is recorded, so this bounds the channels of a single
    // distribution.
    64
}
