use std::{env, env::VarError};

/// There's no real CLI for the worker, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    const DISPLAY_ENVS: [&str; 14] = [
        "RUST_LOG",
        "OWF_DATABASE_URL",
        "OWF_RUN_MIGRATIONS",
        "OWF_POLL_INTERVAL_MS",
        "OWF_EVENT_BUFFER_SIZE",
        "OWF_MAX_RETRIES",
        "OWF_RETRY_DELAY_MS",
        "OWF_RETRY_BACKOFF",
        "OWF_MAX_RETRY_DELAY_MS",
        "OWF_TASK_TIMEOUT_MS",
        "OWF_AUTO_TRANSITION_DELAY_MS",
        "OWF_WORKER_SHARDS",
        "OWF_FAIL_CLOSED_CONDITIONS",
        "OWF_ADMIN_CHANNEL",
    ];

    println!("Current environment values:");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
