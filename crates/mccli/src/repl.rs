//! Interactive loop.
//!
//! Line editing runs on its own OS thread (rustyline blocks). The async side
//! hands it one prompt per line, so the prompt always reflects the current
//! recipient. Output produced while the editor is idle goes straight to
//! stdout; output from push notifications arriving mid-edit goes through the
//! editor's external printer so the prompt is redrawn.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use rustyline::error::ReadlineError;
use rustyline::ExternalPrinter;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::chat::{AckWatch, ChatSession, LineAction};
use crate::pipeline::Interrupt;
use crate::wait::{WaitCoordinator, WaitOutcome};

type Printer = Box<dyn ExternalPrinter + Send>;

#[derive(Debug)]
enum ReadlineEvent {
    Line(String),
    Eof,
}

/// Ctrl-C stops the running chain and cancels outstanding waits.
pub fn install_interrupt_handler(interrupt: Arc<Interrupt>, waits: WaitCoordinator) {
    let result = ctrlc::set_handler(move || {
        debug!("interrupted");
        interrupt.trigger();
        waits.cancel_all();
    });
    if let Err(e) = result {
        warn!("could not install Ctrl-C handler: {}", e);
    }
}

fn spawn_readline_thread(
    history: Option<PathBuf>,
) -> (
    mpsc::UnboundedReceiver<ReadlineEvent>,
    std::sync::mpsc::Sender<String>,
    Option<Printer>,
    Option<JoinHandle<()>>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (prompt_tx, prompt_rx) = std::sync::mpsc::channel::<String>();
    let (printer_tx, printer_rx) = std::sync::mpsc::sync_channel::<Option<Printer>>(1);

    let spawned = std::thread::Builder::new()
        .name("readline".into())
        .spawn(move || {
            let config = rustyline::Config::builder().auto_add_history(true).build();
            let mut editor = match rustyline::DefaultEditor::with_config(config) {
                Ok(editor) => editor,
                Err(e) => {
                    error!("cannot start line editor: {}", e);
                    let _ = printer_tx.send(None);
                    let _ = event_tx.send(ReadlineEvent::Eof);
                    return;
                }
            };
            if let Some(path) = &history {
                if let Err(e) = editor.load_history(path) {
                    debug!("no history loaded: {}", e);
                }
            }
            let printer = editor
                .create_external_printer()
                .ok()
                .map(|p| Box::new(p) as Printer);
            let _ = printer_tx.send(printer);

            'prompts: while let Ok(prompt) = prompt_rx.recv() {
                loop {
                    match editor.readline(&prompt) {
                        Ok(line) => {
                            if event_tx.send(ReadlineEvent::Line(line)).is_err() {
                                break 'prompts;
                            }
                            break;
                        }
                        // Ctrl-C at the prompt clears the line
                        Err(ReadlineError::Interrupted) => continue,
                        Err(ReadlineError::Eof) => {
                            let _ = event_tx.send(ReadlineEvent::Eof);
                            break 'prompts;
                        }
                        Err(e) => {
                            error!("readline: {}", e);
                            let _ = event_tx.send(ReadlineEvent::Eof);
                            break 'prompts;
                        }
                    }
                }
            }

            if let Some(path) = &history {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = editor.save_history(path) {
                    warn!("could not save history: {}", e);
                }
            }
        });

    let handle = match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!("failed to spawn readline thread: {}", e);
            None
        }
    };
    let printer = printer_rx.recv().ok().flatten();
    (event_rx, prompt_tx, printer, handle)
}

fn emit(printer: &mut Option<Printer>, text: String) {
    match printer {
        Some(p) => {
            if let Err(e) = p.print(format!("{}\n", text)) {
                debug!("external printer failed: {}", e);
                println!("{}", text);
            }
        }
        None => println!("{}", text),
    }
}

fn watch_ack(watch: AckWatch, done: mpsc::UnboundedSender<(u32, WaitOutcome)>) {
    let AckWatch { ack_code, mut wait, .. } = watch;
    tokio::spawn(async move {
        let outcome = wait.outcome().await;
        let _ = done.send((ack_code, outcome));
    });
}

/// Run the interactive loop until `quit` or end of input.
pub async fn run(mut chat: ChatSession, history: Option<PathBuf>) {
    let (observer_tx, mut events) = mpsc::unbounded_channel();
    chat.pipeline().waits().set_observer(observer_tx);
    let (ack_tx, mut acks) = mpsc::unbounded_channel::<(u32, WaitOutcome)>();

    let (mut lines, prompts, mut printer, editor_thread) = spawn_readline_thread(history);
    let mut prompting = prompts.send(chat.prompt()).is_ok();

    while prompting {
        tokio::select! {
            Some(event) = events.recv() => {
                let mut print = |text: String| emit(&mut printer, text);
                chat.handle_event(event, &mut print).await;
            }
            Some((ack_code, outcome)) = acks.recv() => {
                chat.on_ack(ack_code, &outcome);
            }
            line = lines.recv() => match line {
                Some(ReadlineEvent::Line(line)) => {
                    let mut print = |text: String| println!("{}", text);
                    let action = chat.handle_line(&line, &mut print).await;
                    for watch in chat.take_ack_watches() {
                        watch_ack(watch, ack_tx.clone());
                    }
                    prompting = action == LineAction::Continue && prompts.send(chat.prompt()).is_ok();
                }
                Some(ReadlineEvent::Eof) | None => prompting = false,
            },
        }
    }

    chat.pipeline_mut().cancel_waits();
    drop(prompts);
    if let Some(handle) = editor_thread {
        if handle.join().is_err() {
            warn!("readline thread panicked");
        }
    }
}
