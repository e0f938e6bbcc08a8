// SPDX-License-Identifier: GPL-2.0-or-later

//! The standalone replay binary (spec.md §6 "CLI"). Mirrors
//! `sentryshot/main.rs`'s shape: parse args, build the explicit
//! collaborators (`Logger`, sinks), construct the top-level type, run it,
//! translate the outcome into a process exit code.

mod args;
mod console;
mod env;

use args::Args;
use clap::Parser;
use common::{ArcLogger, ArcMessageSink, ArcVideoSink, Logger, RequestedCameras, RouteId};
use console::{ConsoleMessageSink, ConsoleVideoSink};
use controller::{ControllerConfig, ControllerSignal, ReplayController};
use fetch::FetchOptions;
use route::RouteConfig;
use std::str::FromStr;
use std::sync::Arc;

/// Route resolved locally or remotely, but no segment ever became ready.
const EXIT_NO_SEGMENTS: i32 = 2;
/// Route could not be resolved at all, or the route id was malformed.
const EXIT_ROUTE_NOT_FOUND: i32 = 1;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    std::process::exit(run(args).await);
}

async fn run(args: Args) -> i32 {
    let logger: ArcLogger = Arc::new(Logger::new());

    let route = match RouteId::from_str(&args.route) {
        Ok(route) => route,
        Err(e) => {
            eprintln!("invalid route id '{}': {e}", args.route);
            return EXIT_ROUTE_NOT_FOUND;
        }
    };

    let cameras = RequestedCameras {
        road: true,
        driver: args.dcam,
        wide: args.ecam,
        prefer_qcam: args.qcamera,
    };

    let config = ControllerConfig {
        cameras,
        fetch_opts: FetchOptions {
            local_cache: !args.no_file_cache,
            ..FetchOptions::default()
        },
        route_config: RouteConfig::default(),
        cache_dir: args.cache_dir.clone(),
        flags: args.replay_flags(),
        initial_speed: args.speed,
    };

    let message_sink = Arc::new(ConsoleMessageSink::new());
    let video_sink: Option<ArcVideoSink> = if args.no_vipc {
        None
    } else {
        Some(Arc::new(ConsoleVideoSink::new()))
    };
    let filter = env::filter_from_env(Some(&logger));

    let controller = ReplayController::with_logger(
        config,
        Arc::clone(&message_sink) as ArcMessageSink,
        video_sink,
        filter,
        Some(Arc::clone(&logger)),
    );

    match controller.load(&route).await {
        Ok(true) => {}
        Ok(false) => {
            eprintln!("route '{route}' resolved but no segment ever became ready");
            return EXIT_NO_SEGMENTS;
        }
        Err(e) => {
            eprintln!("failed to load route '{route}': {e}");
            return EXIT_ROUTE_NOT_FOUND;
        }
    }

    controller.start(args.start).await;

    let mut signals = controller.subscribe();
    tokio::select! {
        () = wait_for_stop(&mut signals) => {}
        _ = tokio::signal::ctrl_c() => {
            controller.stop().await;
        }
    }

    for (tag, count) in message_sink.summary().await {
        println!("{}: {count}", tag.name());
    }

    0
}

/// Prints progress/segment-change signals as they arrive and returns once
/// the controller reports `Stopped` (natural end of a `NO_LOOP` run).
async fn wait_for_stop(signals: &mut tokio::sync::broadcast::Receiver<ControllerSignal>) {
    loop {
        match signals.recv().await {
            Ok(ControllerSignal::Stopped) | Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                return;
            }
            Ok(ControllerSignal::Progress {
                current_secs,
                total_secs,
            }) => {
                println!("progress: {current_secs:.1}s / {total_secs:.1}s");
            }
            Ok(ControllerSignal::SegmentChanged(id)) => {
                println!("segment changed: {id}");
            }
            Ok(ControllerSignal::StreamStarted) => {
                println!("stream started");
            }
            Ok(ControllerSignal::Summary(s)) => {
                println!("{s}");
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
        }
    }
}
