use std::io::BufRead;
use std::sync::Arc;
use std::thread;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ordervoice::command::{Navigator, ResultKind};
use ordervoice::config::Config;
use ordervoice::console::ConsolePlatform;
use ordervoice::engine::VoicePlatform;
use ordervoice::grammar::build_vocabulary_with_extra;
use ordervoice::session::{SessionEvent, VoiceSessionController};

#[derive(Parser)]
#[command(name = "ordervoice")]
struct Cli {
    /// Number of orders in the simulated list
    #[arg(long, default_value_t = 25)]
    orders: usize,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the recognizer vocabulary and exit
    Vocab,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load();

    if matches!(cli.command, Some(Command::Vocab)) {
        for word in build_vocabulary_with_extra(&config.grammar.extra_words) {
            println!("{}", word);
        }
        return Ok(());
    }

    run_session(cli.orders, &config)
}

/// Interactive simulated session: stdin lines play the role of final
/// transcripts, `:`-prefixed lines drive the controller itself.
fn run_session(orders_len: usize, config: &Config) -> Result<()> {
    let platform = Arc::new(ConsolePlatform::new());
    let navigator = Box::new(ConsoleNavigator {
        index: 0,
        orders_len,
    });
    let mut controller = VoiceSessionController::new(
        Arc::clone(&platform) as Arc<dyn VoicePlatform>,
        navigator,
        orders_len,
        config,
    )?;

    // Session events -> console, off the input loop.
    let events = controller.events().clone();
    let printer = thread::spawn(move || {
        for event in events.iter() {
            match event {
                SessionEvent::StateChanged(state) => println!("[session] {}", state),
                SessionEvent::Dispatch(result) => {
                    let tag = match result.kind {
                        ResultKind::Success => "ok",
                        ResultKind::Error => "error",
                        ResultKind::Info => "info",
                    };
                    println!("[{}] {}", tag, result.message);
                }
                SessionEvent::Partial(text) => println!("... {}", text),
            }
        }
    });

    let (line_tx, line_rx) = flume::unbounded::<String>();
    {
        let line_tx = line_tx.clone();
        ctrlc::set_handler(move || {
            let _ = line_tx.send(":quit".to_string());
        })?;
    }
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.send(line).is_err() {
                break;
            }
        }
        let _ = line_tx.send(":quit".to_string());
    });

    println!(
        "Simulated voice session over {} orders. Type a command (\"next order\", \
         \"open order 7\", \"last\"), or :toggle / :stop / :status / :quit.\n",
        orders_len
    );
    controller.toggle();

    for line in line_rx.iter() {
        let line = line.trim();
        match line {
            "" => {}
            ":quit" | ":q" => break,
            ":toggle" | ":mic" => controller.toggle(),
            ":stop" => controller.stop(),
            ":status" => {
                let status = controller.status();
                println!("[status] {:?}: {}", status.kind, status.message);
            }
            _ => platform.submit_line(line),
        }
    }

    controller.shutdown();
    drop(controller);
    let _ = printer.join();
    Ok(())
}

/// Stand-in for the order list UI: keeps a cursor and prints where the
/// voice commands moved it.
struct ConsoleNavigator {
    index: usize,
    orders_len: usize,
}

impl ConsoleNavigator {
    fn show(&self) {
        println!("  -> order {} of {}", self.index + 1, self.orders_len);
    }
}

impl Navigator for ConsoleNavigator {
    fn next_order(&mut self) {
        if self.index + 1 < self.orders_len {
            self.index += 1;
        }
        self.show();
    }

    fn prev_order(&mut self) {
        self.index = self.index.saturating_sub(1);
        self.show();
    }

    fn select_order(&mut self, index: usize) {
        self.index = index.min(self.orders_len.saturating_sub(1));
        self.show();
    }
}
