//! CLI binary to tail and publish messages on a NATS JetStream topic.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use courier_stream::{
    CborCodec, Codec, Config, Consumer, ErrorKind, JsonCodec, Message, Producer, Stream,
    StreamError,
};
use courier_stream_nats::{NatsStream, connect_stream};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Config file could not be read
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        /// Path of the config file
        path: PathBuf,

        /// Underlying IO error
        source: std::io::Error,
    },

    /// Config file is not valid TOML for a stream config
    #[error("invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A line on stdin is not valid JSON
    #[error("line {line} is not valid JSON: {source}")]
    Input {
        /// One-based line number
        line: usize,

        /// Underlying parse error
        source: serde_json::Error,
    },

    /// NATS connection error
    #[error(transparent)]
    Nats(#[from] courier_stream_nats::Error),

    /// Reading stdin failed
    #[error("failed to read stdin: {0}")]
    Stdin(#[source] std::io::Error),

    /// Stream error
    #[error(transparent)]
    Stream(#[from] courier_stream_broker::Error),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum CodecKind {
    #[default]
    Json,
    Cbor,
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Stream config file (TOML)
    #[arg(long, env = "COURIER_CONFIG")]
    config: PathBuf,

    /// Payload serialization
    #[arg(long, value_enum, default_value_t = CodecKind::Json, env = "COURIER_CODEC")]
    codec: CodecKind,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
enum Command {
    /// Read messages, log them and acknowledge each one
    Tail {
        /// Consumer group
        #[arg(long, default_value = "courier")]
        group: String,
    },

    /// Publish one message per JSON line read from stdin
    Publish {
        /// Message type
        #[arg(long = "type")]
        kind: String,

        /// Message source
        #[arg(long)]
        source: String,

        /// Producer group
        #[arg(long, default_value = "courier")]
        group: String,
    },
}

fn parse_config(contents: &str) -> Result<Config, Error> {
    Ok(toml::from_str(contents)?)
}

async fn load_config(path: &Path) -> Result<Config, Error> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;

    parse_config(&contents)
}

async fn tail<C>(stream: NatsStream<C>, group: String, cancel: CancellationToken) -> Result<(), Error>
where
    C: Codec,
{
    let consumer = stream.consumer(group).await?;

    loop {
        let message = match consumer.read(&cancel).await {
            Ok(message) => message,
            Err(e) if e.is_cancelled() => break,
            Err(e) if e.kind() == ErrorKind::Format => {
                warn!("skipping malformed message: {}", e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            "{} {} from {} at {}: {}",
            message.id,
            message.kind,
            message.source,
            message.time.to_rfc3339(),
            message.data
        );

        match consumer.ack(&cancel, message).await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => break,
            Err(e) => return Err(e.into()),
        }
    }

    consumer.close().await?;

    Ok(())
}

async fn publish<C>(
    stream: NatsStream<C>,
    kind: String,
    source: String,
    group: String,
    cancel: CancellationToken,
) -> Result<(), Error>
where
    C: Codec,
{
    let producer = stream.producer(group).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut number = 0;

    loop {
        let line = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            line = lines.next_line() => line.map_err(Error::Stdin)?,
        };

        let Some(line) = line else {
            break;
        };

        number += 1;
        if line.trim().is_empty() {
            continue;
        }

        let data = serde_json::from_str(&line).map_err(|source| Error::Input {
            line: number,
            source,
        })?;

        let message = Message::new(
            Uuid::new_v4().to_string(),
            kind.as_str(),
            source.as_str(),
            Utc::now(),
            data,
        );

        match producer.publish(&cancel, &message).await {
            Ok(()) => info!("published {}", message.id),
            Err(e) if e.is_cancelled() => break,
            Err(e) => return Err(e.into()),
        }
    }

    producer.close().await?;

    Ok(())
}

async fn run<C>(config: Config, codec: C, command: Command, cancel: CancellationToken) -> Result<(), Error>
where
    C: Codec,
{
    let stream = connect_stream(config, codec).await?;

    match command {
        Command::Tail { group } => tail(stream, group, cancel).await,
        Command::Publish {
            kind,
            source,
            group,
        } => publish(stream, kind, source, group, cancel).await,
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        if let (Ok(mut sigterm), Ok(mut sigint)) = (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM"),
                _ = sigint.recv() => info!("Received SIGINT"),
            }
            return;
        }
    }

    let _ = tokio::signal::ctrl_c().await;
    info!("Received interrupt signal");
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = load_config(&args.config).await?;

    let shutdown_token = CancellationToken::new();

    let signal_shutdown_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;

        info!("Shutting down");
        signal_shutdown_token.cancel();
    });

    match args.codec {
        CodecKind::Json => run(config, JsonCodec, args.command, shutdown_token).await,
        CodecKind::Cbor => run(config, CborCodec, args.command, shutdown_token).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use courier_stream::{RawHeaders, WireMode};

    #[test]
    fn test_parse_tail_args() {
        let args = Args::try_parse_from([
            "courier", "--config", "stream.toml", "--codec", "cbor", "tail", "--group", "billing",
        ])
        .unwrap();

        assert_eq!(args.config, PathBuf::from("stream.toml"));
        assert_eq!(args.codec, CodecKind::Cbor);
        assert_eq!(
            args.command,
            Command::Tail {
                group: "billing".to_string()
            }
        );
    }

    #[test]
    fn test_parse_publish_args() {
        let args = Args::try_parse_from([
            "courier",
            "--config",
            "stream.toml",
            "publish",
            "--type",
            "order.created",
            "--source",
            "shop",
        ])
        .unwrap();

        assert_eq!(
            args.command,
            Command::Publish {
                kind: "order.created".to_string(),
                source: "shop".to_string(),
                group: "courier".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_config() {
        let config = parse_config(
            r#"
            endpoints = ["nats://127.0.0.1:4222"]
            topic = "orders"
            max_inflight_messages = 4

            [wire]
            mode = "raw"
            id_field = "order_id"
            time_field = "created_at"
            type = "order.created"
            source = "shop"
            "#,
        )
        .unwrap();

        assert_eq!(config.topic, "orders");
        assert_eq!(config.max_inflight_messages.get(), 4);
        assert_eq!(
            config.wire,
            WireMode::Raw(RawHeaders {
                id_field: "order_id".to_string(),
                time_field: "created_at".to_string(),
                kind: "order.created".to_string(),
                source: "shop".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_config_rejects_missing_topic() {
        let result = parse_config(r#"endpoints = ["nats://127.0.0.1:4222"]"#);

        assert!(matches!(result, Err(Error::ConfigParse(_))));
    }
}
