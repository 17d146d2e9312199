mod files;
mod handler;
mod http;
mod webserver;

use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Static file server for recorded streams, with CORS headers for the DASH reference player.
#[derive(Parser)]
#[clap(version)]
struct Opts {
    /// Port to listen on
    #[clap(default_value = "8000")]
    port: u16,
    /// Address to bind
    #[clap(long, default_value = "0.0.0.0")]
    bind: IpAddr,
    /// Directory to serve
    #[clap(long, default_value = ".")]
    root: PathBuf,
    /// Origin allowed to fetch cross-origin
    #[clap(long, default_value = http::CorsPolicy::DEFAULT_ORIGIN)]
    allow_origin: String,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();
    let root = files::DocumentRoot::new(&opts.root)?;
    let cors = http::CorsPolicy::new(opts.allow_origin);
    let handler = handler::RequestHandler::new(root, cors)?;

    println!("Serving directory: {}", handler.root().display());
    println!("Press Ctrl+C to stop the server.");

    let mut server = webserver::WebServer::new(SocketAddr::new(opts.bind, opts.port), handler)?;
    println!(
        "HTTP server is running on port {} (CORS enabled).",
        server.local_addr()?.port()
    );
    server.run()
}
