mod config;
mod db;
mod error;
mod http;
mod image_gen;
mod observability;
mod tg;
mod util;

pub mod content;
pub mod distribution;

pub use crate::error::*;
pub use config::*;
pub use observability::*;

use distribution::{
    Collaborators, DistributionReport, DistributionRequest, DistributionService, ImageGenerator,
};
use std::sync::Arc;

#[allow(unused_imports)]
mod prelude {
    pub(crate) use crate::error::prelude::*;
    pub(crate) use crate::http::prelude::*;
    pub(crate) use crate::observability::logging::prelude::*;
    pub(crate) use crate::util::prelude::*;
}

/// Wires the production collaborators and runs a single distribution
pub async fn run(config: Config, request: DistributionRequest) -> Result<DistributionReport> {
    let db = db::init(config.db).await?;

    let image_generator = image_gen::HttpImageGenerator::from_config(&config.image_gen)?
        .map(|generator| Arc::new(generator) as Arc<dyn ImageGenerator>);

    if image_generator.is_none() {
        tracing::info!("Image generation is not configured, only the existing and fallback images are used");
    }

    let collaborators = Collaborators {
        channels: Arc::new(db::ChannelRepo::new(db.clone())),
        rates: Arc::new(db::SentMessageRepo::new(db.clone())),
        usage: Arc::new(db::AnalyticsRepo::new(db)),
        transport: Arc::new(tg::TgTransport::new(config.tg)),
        image_generator,
    };

    let service = DistributionService::new(&config.distribution, config.buttons, collaborators);

    service.distribute(request).await
}
