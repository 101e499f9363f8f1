//! File watching: debounced filesystem changes trigger a refresh.

use std::path::PathBuf;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use liverefresh_server::LiveRefresh;

/// Starts watching `paths` and refreshes every client once changes settle.
///
/// The watcher stops when the returned handle is dropped.
pub fn spawn_watcher(
    paths: &[PathBuf],
    debounce: Duration,
    live: LiveRefresh,
) -> Result<RecommendedWatcher, notify::Error> {
    let (tx, rx) = mpsc::channel::<Event>(100);

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        // Callback runs on the notify thread.
        Ok(event) => {
            let _ = tx.blocking_send(event);
        }
        Err(e) => tracing::warn!("watch error: {e}"),
    })?;

    for path in paths {
        watcher.watch(path, RecursiveMode::Recursive)?;
        tracing::info!(path = %path.display(), "watching for changes");
    }

    tokio::spawn(debounce_changes(rx, debounce, move |changes| {
        tracing::info!(changes, "files changed");
        if let Err(e) = live.refresh() {
            tracing::error!("refresh failed: {e}");
        }
    }));

    Ok(watcher)
}

/// Coalesces bursts of relevant events; `on_settled` gets the burst size
/// once no event has arrived for `window`.
async fn debounce_changes<F>(mut rx: mpsc::Receiver<Event>, window: Duration, mut on_settled: F)
where
    F: FnMut(usize),
{
    while let Some(event) = rx.recv().await {
        if !is_content_change(&event) {
            continue;
        }

        let mut changes = 1;
        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                () = &mut deadline => break,
                next = rx.recv() => match next {
                    Some(event) if is_content_change(&event) => {
                        changes += 1;
                        deadline.as_mut().reset(tokio::time::Instant::now() + window);
                    }
                    Some(_) => {}
                    None => break,
                },
            }
        }

        on_settled(changes);
    }
}

fn is_content_change(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}
