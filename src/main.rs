use dual_webserver::http::HttpMethod;
use dual_webserver::{handler_fn, logger, shutdown_signal, Config, WebServer};
use hyper::header::{HeaderValue, CONTENT_TYPE};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // First argument names the config file, extension optional
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config".to_string());
    let cfg = Config::load_from(&config_path)?;
    logger::init(&cfg.logging)?;

    // Create the tokio runtime, thread count from workers config
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();

    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
        logger::log_info(&format!("Using {workers} worker threads"));
    } else {
        logger::log_info("Using default worker threads (CPU cores)");
    }

    let runtime = runtime_builder.build()?;

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: Config) -> Result<(), Box<dyn std::error::Error>> {
    logger::log_server_start(&cfg);

    let mut server = WebServer::bind(&cfg).await?;
    server.register(
        HttpMethod::Get,
        "/status",
        handler_fn(|_req, res| {
            res.insert_header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            res.send(br#"{"ok":true}"#)?;
            Ok(())
        }),
    );

    shutdown_signal().await;
    server.close().await;
    Ok(())
}
