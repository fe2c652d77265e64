mod archive;
mod cache;
mod calc;
mod db;
mod export;
mod ipc;
mod logging;
mod rubric;
mod session;
mod timer;

use std::io::{self, BufRead, Write};

fn main() {
    logging::init_tracing();

    let mut state = ipc::AppState::new();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            // Idle tick still drains a due autosave.
            ipc::flush_autosave(&mut state, false);
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id; report and move on.
                let _ = writeln!(
                    stdout,
                    "{{\"ok\":false,\"error\":{{\"code\":\"bad_json\",\"message\":\"{}\"}}}}",
                    e
                );
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();

        ipc::flush_autosave(&mut state, false);
    }

    // Navigating away never aborts a pending write; neither does exit.
    ipc::flush_autosave(&mut state, true);
}
