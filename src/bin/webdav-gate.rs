//
//  WebDAV server with Basic/Digest authentication and per-user directories.
//
//  Reads ./config/config.yaml (or --config), listens on network.address:port.
//

use std::convert::Infallible;
use std::error::Error;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use log::{debug, error, info, warn};
use tokio::net::TcpListener;

use webdav_gate::{hash, AuthHandler, AuthMode, Config, FileSystem, REALM};

#[derive(Debug, clap::Parser)]
#[command(about, version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// run the server
    Serve {
        /// configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// print the stored form of a password, for the users section of the config
    Hash {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
        /// basic (bcrypt) or digest (HA1)
        #[arg(short, long, default_value = "basic")]
        auth_type: AuthMode,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::Serve { config } => {
            let path = config.unwrap_or_else(Config::default_path);
            serve(Config::load(&path)?).await
        }
        Command::Hash {
            username,
            password,
            auth_type,
        } => {
            let stored = match auth_type {
                AuthMode::Basic => hash::hash_password(&password)?,
                AuthMode::Digest => hash::digest_ha1(&username, REALM, &password),
            };
            println!("{stored}");
            Ok(())
        }
    }
}

async fn serve(config: Config) -> Result<(), Box<dyn Error>> {
    if config
        .users
        .get("admin")
        .map_or(false, |admin| admin.password == "admin")
    {
        warn!("user admin has the default password");
    }

    let handler = config.handler_builder()?.build()?;
    let name = match config.filesystem() {
        FileSystem::Local { base, .. } => {
            std::fs::create_dir_all(&base)?;
            base.display().to_string()
        }
        FileSystem::Mem => "memory filesystem".to_string(),
    };

    if let Some(interval) = config.session_sweep_interval() {
        let sessions = handler.sessions().clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = sessions.prune_expired();
                if removed > 0 {
                    debug!("removed {removed} expired sessions");
                }
            }
        });
    }

    let ip: IpAddr = config.network.address.parse()?;
    let addr = SocketAddr::new(ip, config.network.port);
    let listener = TcpListener::bind(addr).await?;
    info!(
        "serving {name} on {addr} ({} auth, prefix {})",
        handler.auth_mode(),
        config.network.prefix
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => spawn_connection(handler.clone(), stream, peer),
                Err(e) => error!("accept failed: {e}"),
            },
            _ = &mut shutdown => {
                info!("shutting down");
                break;
            }
        }
    }
    Ok(())
}

fn spawn_connection(handler: AuthHandler, stream: tokio::net::TcpStream, peer: SocketAddr) {
    tokio::spawn(async move {
        let service = service_fn(move |req: Request<Incoming>| {
            let handler = handler.clone();
            async move { Ok::<_, Infallible>(handler.handle(req).await) }
        });
        if let Err(e) = auto::Builder::new(TokioExecutor::new())
            .serve_connection(TokioIo::new(stream), service)
            .await
        {
            debug!("connection from {peer}: {e}");
        }
    });
}
