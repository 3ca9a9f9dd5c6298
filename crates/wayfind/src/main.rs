mod config;
mod session;
mod terminal;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures_lite::StreamExt;
use is_terminal::IsTerminal;
use macro_rules_attribute::apply;
use smol_macros::main;
use wayfind_core::Searcher;
use wayfind_nominatim::Nominatim;

use crate::config::Args;
use crate::session::Session;
use crate::terminal::Line;

#[apply(main!)]
async fn main(executor: Arc<async_executor::Executor<'static>>) {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,isahc=error")),
        )
        .with_writer(std::io::stderr)
        .init();

    let nominatim = match Nominatim::new(args.provider_options()) {
        Ok(nominatim) => nominatim,
        Err(e) => {
            tracing::error!(?e, "failed to create provider");
            std::process::exit(1);
        }
    };

    let endpoint = nominatim.options().endpoint.clone();
    let searcher = Searcher::new(
        executor.clone(),
        Arc::new(nominatim),
        args.context(),
        args.searcher_options(),
    );
    tracing::info!(%endpoint, context = ?searcher.context(), "started");
    let session = Session::new(executor.clone(), Arc::new(searcher));

    futures_lite::future::zip(read_input(&session, &args), display(&session, args.json)).await;
}

/// Feed stdin into the session until EOF or `:quit`.
async fn read_input(session: &Session, args: &Args) {
    let prompt = std::io::stdin().is_terminal() && !args.json;
    let mut lines = terminal::lines();

    loop {
        if prompt {
            print!("> ");
            let _ = std::io::stdout().flush();
        }
        let Some(line) = lines.next().await else {
            break;
        };
        match line {
            Line::Cancel => session.cancel(),
            Line::ClearCache => session.clear_cache(),
            Line::Refetch => session.refetch(),
            Line::Quit => {
                session.close();
                return;
            }
            Line::Text(text) => match args.typing_ms {
                Some(ms) => {
                    for prefix in terminal::keystrokes(&text) {
                        session.set_input(prefix);
                        async_io::Timer::after(Duration::from_millis(ms)).await;
                    }
                }
                None => session.set_input(&text),
            },
        }
    }

    session.settled().await;
    session.close();
}

/// Print every settled view once.
async fn display(session: &Session, json: bool) {
    let mut changes = session.changes();
    let mut printer = terminal::Printer::new(json);

    while changes.next().await.is_some() {
        if let Some(out) = printer.render_settled(&session.view()) {
            print!("{out}");
            let _ = std::io::stdout().flush();
        }
    }
}
