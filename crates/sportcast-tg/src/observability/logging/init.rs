use crate::config::from_env_or_panic;
use crate::observability::GLOBAL_LABELS;
use crate::prelude::*;
use serde::Deserialize;
use serde_with::serde_as;
use std::collections::HashMap;
use std::ops::Deref;
use tracing_subscriber::prelude::*;

/// Handle to the background task that ships the logs to Loki.
/// It must be shut down before the process exits to flush the buffered logs.
pub struct LoggingTask {
    loki: Option<LokiTask>,
}

struct LokiTask {
    task: tokio::task::JoinHandle<()>,
    controller: tracing_loki::BackgroundTaskController,
}

impl LoggingTask {
    pub async fn shutdown(self) {
        let Some(LokiTask { task, controller }) = self.loki else {
            return;
        };

        info!("Waiting for the logging task to finish nicely...");

        let ((), duration) = controller.shutdown().with_duration().await;

        eprintln!("Stopped logging task in {:.2?}: {:?}", duration, task.await);
    }
}

/// Must be called inside of the tokio runtime, because the Loki exporter
/// is spawned as a background task.
pub fn init_logging() -> LoggingTask {
    LoggingConfig::load_or_panic().init_logging()
}

#[serde_as]
#[derive(Deserialize)]
struct LoggingConfig {
    loki_url: Option<url::Url>,

    #[serde_as(as = "Option<serde_with::json::JsonString>")]
    #[serde(default)]
    loki_labels: Option<HashMap<String, String>>,
}

impl LoggingConfig {
    fn load_or_panic() -> LoggingConfig {
        from_env_or_panic("")
    }

    fn init_logging(self) -> LoggingTask {
        let env_filter = tracing_subscriber::EnvFilter::try_from_env("SPORTCAST_LOG")
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

        // Stdout is reserved for the distribution report
        let fmt = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_ansi(std::env::var("COLORS").as_deref() != Ok("0"))
            .pretty();

        let (loki, loki_task) = match self.loki_url {
            Some(loki_url) => {
                let (layer, task) = init_loki(loki_url, self.loki_labels.unwrap_or_default());
                (Some(layer), Some(task))
            }
            None => (None, None),
        };

        tracing_subscriber::registry()
            .with(fmt)
            .with(loki)
            .with(env_filter)
            .with(tracing_error::ErrorLayer::default())
            .init();

        init_panic_hook();

        LoggingTask { loki: loki_task }
    }
}

fn init_loki(
    loki_url: url::Url,
    mut labels: HashMap<String, String>,
) -> (tracing_loki::Layer, LokiTask) {
    let additional_labels = GLOBAL_LABELS.iter().chain(&[("source", "sportcast-tg")]);

    labels.extend(additional_labels.map(|(k, v)| ((*k).to_owned(), (*v).to_owned())));

    let (layer, controller, task) = labels
        .into_iter()
        .fold(tracing_loki::builder(), |builder, (key, value)| {
            builder
                .label(key.clone(), value)
                .unwrap_or_else(|err| panic!("BUG: invalid Loki label `{key}`: {err}"))
        })
        .build_controller_url(loki_url)
        .unwrap_or_else(|err| panic!("BUG: failed to initialize Loki exporter: {err}"));

    let task = tokio::spawn(task);

    (layer, LokiTask { task, controller })
}

fn init_panic_hook() {
    let current_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        // It's super-important to call the default panic hook, otherwise
        // we may not see it in the logs at all, because the panic may
        // happen inside of `tracing` logging system itself.
        current_hook(panic_info);

        let backtrace = std::backtrace::Backtrace::capture();
        let location = panic_info.location().map(|location| {
            format!(
                "{}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            )
        });

        // If the panic message was formatted using interpolated values,
        // it will be a `String`. Otherwise, it will be a `&str`.
        let payload = panic_info.payload();
        let message = payload
            .downcast_ref::<String>()
            .map(<_>::deref)
            .or_else(|| payload.downcast_ref::<&str>().map(<_>::deref))
            .unwrap_or("<unknown>");

        let span_trace = tracing_error::SpanTrace::capture();

        error!(
            target: "panic",
            thread = std::thread::current().name(),
            location,
            span_trace = %span_trace,
            backtrace = format_args!("\n{backtrace}"),
            "{message}"
        );
    }));
}
