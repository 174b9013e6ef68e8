use clap::Parser;
use tokio::sync::mpsc;

use paxterm::cli::Cli;
use paxterm::config::TermConfig;
use paxterm::session::{ExitReason, Session, Settings};
use paxterm::session_log::SessionLog;
use paxterm::terminal::StdioTerminal;
use paxterm::{logging, TermError};
use paxterm_link::LinkMachine;
use paxterm_tnc::KissTnc;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init();

    let invocation = match cli.invocation() {
        Ok(inv) => inv,
        Err(e) => {
            eprintln!("paxterm: {e}");
            std::process::exit(2);
        }
    };

    let file_cfg = match &cli.config {
        Some(path) => match TermConfig::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("paxterm: {e}");
                std::process::exit(2);
            }
        },
        None => TermConfig::default(),
    };

    let host = invocation.host.unwrap_or(file_cfg.kiss.host);
    let port = invocation.port.unwrap_or(file_cfg.kiss.port);
    let addr = format!("{host}:{port}");

    let tnc = match KissTnc::connect(&addr).await {
        Ok(tnc) => tnc,
        Err(e) => {
            eprintln!("paxterm: {}", TermError::Transport(e));
            std::process::exit(1);
        }
    };

    let log = match SessionLog::create() {
        Ok(log) => Some(log),
        Err(e) => {
            tracing::warn!("session log disabled: {e}");
            None
        }
    };
    let term = StdioTerminal::new(log);
    let log_path = term.log_path();

    println!("<KISS AX.25 Terminal>  MYCALL={}  KISS={addr}", cli.mycall);
    println!("Type /help for commands.");

    let machine = LinkMachine::new(cli.mycall, file_cfg.link.to_link_config());
    let settings = Settings {
        local_echo: file_cfg.terminal.echo,
        crlf: file_cfg.terminal.crlf,
        debug: false,
    };
    let mut session = Session::new(machine, tnc, term, settings, log_path);

    if let Some(target) = invocation.target {
        session.auto_connect(target, Vec::new());
    }

    // Reader thread: stdin lines into the session loop.
    let (input_tx, mut input_rx) = mpsc::channel::<String>(32);
    {
        let tx = input_tx.clone();
        std::thread::spawn(move || {
            for line in std::io::stdin().lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });
    }

    // Ctrl-C quits the same way /quit does.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = input_tx.send("/quit".to_string()).await;
        }
    });

    match session.run(&mut input_rx).await {
        ExitReason::Quit => {
            println!("<KISS AX.25 Terminal> bye.");
        }
        ExitReason::TransportDown => {
            eprintln!("paxterm: TNC connection lost");
            std::process::exit(1);
        }
    }
}
