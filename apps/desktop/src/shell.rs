use std::{path::PathBuf, sync::Arc};

use client_core::{ColorizeSession, PipelinePhase, SessionEvent, PROGRESS_COMPLETE};
use shared::domain::SessionView;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{broadcast::error::RecvError, watch},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
    feedback::{describe_download_failure, describe_failure},
    input::load_upload,
    preferences::PreferencesStore,
};

const HELP: &str = "\
commands:
  select <path>          choose the image to colorize
  submit                 send the selected image to the service
  status                 show selection, progress, result and settings
  history                list saved results, newest first
  download [path]        save the current result
  save <index> [path]    save a history entry's colorized image
  toggle hq|autosave|dark
  view colorize|history|settings
  gallery                same as `view history`
  clear-history
  help
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Select(PathBuf),
    Submit,
    Status,
    History,
    Download(Option<PathBuf>),
    SaveEntry { index: usize, path: Option<PathBuf> },
    Toggle(Toggle),
    View(SessionView),
    ClearHistory,
    Help,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    HighQuality,
    AutoSave,
    DarkMode,
}

pub fn parse_command(line: &str) -> Result<ShellCommand, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err("empty command".into());
    };
    let rest: Vec<&str> = words.collect();
    let path_arg = |index: usize| rest.get(index).map(PathBuf::from);

    let command = match verb.to_ascii_lowercase().as_str() {
        "select" | "open" => {
            if rest.is_empty() {
                return Err("usage: select <path>".into());
            }
            ShellCommand::Select(PathBuf::from(rest.join(" ")))
        }
        "submit" | "colorize" => ShellCommand::Submit,
        "status" => ShellCommand::Status,
        "history" | "list" => ShellCommand::History,
        "download" => ShellCommand::Download(path_arg(0)),
        "save" => {
            let index = rest
                .first()
                .and_then(|raw| raw.parse().ok())
                .ok_or("usage: save <index> [path]")?;
            ShellCommand::SaveEntry {
                index,
                path: path_arg(1),
            }
        }
        "toggle" => {
            let toggle = match rest.first().map(|word| word.to_ascii_lowercase()).as_deref() {
                Some("hq" | "high-quality" | "quality") => Toggle::HighQuality,
                Some("autosave" | "auto-save") => Toggle::AutoSave,
                Some("dark" | "dark-mode" | "theme") => Toggle::DarkMode,
                _ => return Err("usage: toggle hq|autosave|dark".into()),
            };
            ShellCommand::Toggle(toggle)
        }
        "view" => {
            let view = rest.first().ok_or("usage: view colorize|history|settings")?;
            ShellCommand::View(view.parse()?)
        }
        "gallery" => ShellCommand::View(SessionView::History),
        "clear-history" => ShellCommand::ClearHistory,
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" => ShellCommand::Quit,
        other => return Err(format!("unknown command '{other}'; try `help`")),
    };
    Ok(command)
}

pub async fn run_shell(
    session: Arc<ColorizeSession>,
    preferences: PreferencesStore,
    max_upload_bytes: u64,
) -> anyhow::Result<()> {
    let event_task = spawn_event_printer(&session);
    let progress_task = spawn_progress_printer(&session, false);
    let mut in_flight: Option<JoinHandle<()>> = None;

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };
        debug!(?command, "shell command");

        match command {
            ShellCommand::Select(path) => match load_upload(&path, max_upload_bytes).await {
                Ok(upload) => {
                    let preview = session.select_image(upload);
                    println!("selected {} as {}", path.display(), preview.uri());
                }
                Err(err) => println!("{err:#}"),
            },
            ShellCommand::Submit => {
                let session = Arc::clone(&session);
                let task = tokio::spawn(async move {
                    match session.submit().await {
                        Ok(result) => println!("colorized: {}", result.colorized.uri()),
                        Err(err) => println!("{}", describe_failure(&err)),
                    }
                });
                track_submission(&mut in_flight, task);
            }
            ShellCommand::Status => print_status(&session),
            ShellCommand::History => print_history(&session),
            ShellCommand::Download(path) => {
                let Some(result) = session.current_result() else {
                    println!("Nothing to download yet.");
                    continue;
                };
                save(&session, &result.colorized, path).await;
            }
            ShellCommand::SaveEntry { index, path } => {
                let Some(entry) = session.history_entry(index) else {
                    println!("No history entry {index}.");
                    continue;
                };
                save(&session, &entry.colorized, path).await;
            }
            ShellCommand::Toggle(toggle) => {
                let (name, enabled) = match toggle {
                    Toggle::HighQuality => ("high quality", session.toggle_high_quality()),
                    Toggle::AutoSave => ("auto-save", session.toggle_auto_save()),
                    Toggle::DarkMode => ("dark mode", session.toggle_dark_mode()),
                };
                println!("{name}: {}", on_off(enabled));
                if let Err(err) = preferences.save(&session.settings()) {
                    warn!("failed to persist settings: {err:#}");
                }
            }
            ShellCommand::View(view) => session.set_view(view),
            ShellCommand::ClearHistory => session.clear_history(),
            ShellCommand::Help => println!("{HELP}"),
            ShellCommand::Quit => break,
        }
    }

    if let Some(task) = in_flight.filter(|task| !task.is_finished()) {
        println!("abandoning the running colorization");
        task.abort();
    }
    event_task.abort();
    progress_task.abort();
    Ok(())
}

// A submit refused as busy must not displace the handle of the running one.
fn track_submission(in_flight: &mut Option<JoinHandle<()>>, task: JoinHandle<()>) {
    if in_flight.as_ref().is_some_and(|running| !running.is_finished()) {
        return;
    }
    *in_flight = Some(task);
}

async fn save(session: &ColorizeSession, image: &client_core::DisplayRef, path: Option<PathBuf>) {
    let destination = path.unwrap_or_else(|| PathBuf::from("."));
    match session.download_result(image, &destination).await {
        Ok(path) => println!("saved {}", path.display()),
        Err(err) => println!("{}", describe_download_failure(&err)),
    }
}

fn spawn_event_printer(session: &ColorizeSession) -> JoinHandle<()> {
    let mut events = session.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::ThemeChanged(theme)) => println!("theme: {theme:?}"),
                Ok(SessionEvent::ViewChanged(view)) => println!("view: {view}"),
                Ok(SessionEvent::HistoryChanged { len }) => println!("history: {len} saved"),
                Ok(SessionEvent::PhaseChanged(phase)) => debug!(?phase, "pipeline phase"),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "event printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// With `until_complete`, the task ends right after reporting 100%, so a caller
/// can await it to flush the final value.
pub fn spawn_progress_printer(session: &ColorizeSession, until_complete: bool) -> JoinHandle<()> {
    let progress = session.subscribe_progress();
    tokio::spawn(report_progress(progress, until_complete, |value| {
        eprintln!("progress: {value}%");
    }))
}

async fn report_progress(
    mut progress: watch::Receiver<u8>,
    until_complete: bool,
    mut emit: impl FnMut(u8),
) {
    while progress.changed().await.is_ok() {
        let value = *progress.borrow_and_update();
        emit(value);
        if until_complete && value >= PROGRESS_COMPLETE {
            break;
        }
    }
}

fn print_status(session: &ColorizeSession) {
    let snapshot = session.snapshot();
    let phase = match snapshot.phase {
        PipelinePhase::Idle => "idle".to_string(),
        PipelinePhase::Submitting(id) => format!("submitting {id}"),
        PipelinePhase::Succeeded(id) => format!("succeeded {id}"),
        PipelinePhase::Failed(id) => format!("failed {id}"),
    };
    println!("view:      {}", snapshot.view);
    println!("phase:     {phase} ({}%)", snapshot.progress);
    println!(
        "selected:  {}",
        snapshot
            .preview
            .as_ref()
            .map_or_else(|| "none".to_string(), |preview| preview.uri())
    );
    println!(
        "result:    {}",
        snapshot
            .result
            .as_ref()
            .map_or_else(|| "none".to_string(), |result| result.colorized.uri())
    );
    if let Some(failure) = &snapshot.last_failure {
        println!("last error: {failure}");
    }
    println!(
        "settings:  high quality {}, auto-save {}, dark mode {}",
        on_off(snapshot.settings.high_quality),
        on_off(snapshot.settings.auto_save),
        on_off(snapshot.settings.dark_mode)
    );
    println!("history:   {} saved", snapshot.history.len());
}

fn print_history(session: &ColorizeSession) {
    let history = session.history();
    if history.is_empty() {
        println!("History is empty.");
        return;
    }
    for (index, entry) in history.iter().enumerate() {
        println!(
            "{index}: {} {} -> {}",
            entry.timestamp.format("%H:%M:%S"),
            entry.original.uri(),
            entry.colorized.uri()
        );
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_paths_with_spaces() {
        assert_eq!(
            parse_command("select my photos/old one.png"),
            Ok(ShellCommand::Select(PathBuf::from("my photos/old one.png")))
        );
    }

    #[test]
    fn gallery_routes_to_history_view() {
        assert_eq!(
            parse_command("gallery"),
            Ok(ShellCommand::View(SessionView::History))
        );
        assert_eq!(
            parse_command("view gallery"),
            Ok(ShellCommand::View(SessionView::History))
        );
    }

    #[test]
    fn toggles_accept_short_names() {
        assert_eq!(
            parse_command("toggle hq"),
            Ok(ShellCommand::Toggle(Toggle::HighQuality))
        );
        assert_eq!(
            parse_command("TOGGLE Dark"),
            Ok(ShellCommand::Toggle(Toggle::DarkMode))
        );
        assert!(parse_command("toggle volume").is_err());
    }

    #[test]
    fn save_requires_numeric_index() {
        assert_eq!(
            parse_command("save 2 out.jpg"),
            Ok(ShellCommand::SaveEntry {
                index: 2,
                path: Some(PathBuf::from("out.jpg"))
            })
        );
        assert!(parse_command("save latest").is_err());
    }

    async fn finished(task: &JoinHandle<()>) {
        while !task.is_finished() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn running_submission_keeps_its_handle() {
        let mut in_flight = Some(tokio::spawn(std::future::pending::<()>()));

        let refused = tokio::spawn(async {});
        finished(&refused).await;
        track_submission(&mut in_flight, refused);

        let kept = in_flight.take().expect("handle kept");
        assert!(!kept.is_finished());
        kept.abort();
        assert!(kept.await.expect_err("aborted").is_cancelled());
    }

    #[tokio::test]
    async fn finished_submission_is_replaced() {
        let done = tokio::spawn(async {});
        finished(&done).await;
        let mut in_flight = Some(done);

        track_submission(&mut in_flight, tokio::spawn(std::future::pending::<()>()));

        let replaced = in_flight.take().expect("handle stored");
        assert!(!replaced.is_finished());
        replaced.abort();
    }

    #[tokio::test]
    async fn completion_is_reported_before_the_printer_ends() {
        let (tx, rx) = watch::channel(0u8);
        let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();
        let printer = tokio::spawn(report_progress(rx, true, move |value| {
            let _ = seen_tx.send(value);
        }));

        tx.send_replace(40);
        tokio::task::yield_now().await;
        tx.send_replace(PROGRESS_COMPLETE);
        printer.await.expect("printer ends after completion");

        let mut seen = Vec::new();
        while let Ok(value) = seen_rx.try_recv() {
            seen.push(value);
        }
        assert_eq!(seen.last(), Some(&PROGRESS_COMPLETE));
    }

    #[test]
    fn unknown_commands_are_reported() {
        assert!(parse_command("rotate 90").is_err());
        assert!(parse_command("   ").is_err());
    }
}
