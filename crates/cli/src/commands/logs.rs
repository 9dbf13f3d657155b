use gsadmin_channel::messages::LogLine;
use gsadmin_channel::{ConnectionState, Topic, TopicMessage};

use crate::cli::{GlobalArgs, LogsArgs};
use crate::commands::{connect_channel, ctrl_c};
use crate::exit_codes;

pub async fn execute(global: &GlobalArgs, args: LogsArgs) -> anyhow::Result<i32> {
    let channel = connect_channel(global).await;
    if channel.state() == ConnectionState::Disconnected {
        anyhow::bail!(
            "push channel unavailable at {}; log streaming needs a live connection",
            global.url
        );
    }

    let topic = Topic::Logs(args.container.clone());
    channel.subscribe(topic.clone(), print_log);

    let mut states = channel.watch_state();
    let interrupt = ctrl_c();
    tokio::pin!(interrupt);

    let outcome = loop {
        tokio::select! {
            _ = &mut interrupt => break Ok(exit_codes::CANCELLED),
            changed = states.changed() => {
                if changed.is_err() {
                    break Ok(exit_codes::CANCELLED);
                }
            }
        }

        let state = *states.borrow_and_update();
        match state {
            ConnectionState::Connected => {
                tracing::info!(container = %args.container, "Resuming log stream after reconnect");
                channel.subscribe(topic.clone(), print_log);
            }
            ConnectionState::Disconnected => {
                break Err(anyhow::anyhow!(
                    "lost the push channel while streaming logs for {}",
                    args.container
                ));
            }
            ConnectionState::Connecting | ConnectionState::Reconnecting => {}
        }
    };

    channel.disconnect();
    outcome
}

fn print_log(message: TopicMessage) {
    if let TopicMessage::Log(line) = message {
        for text in format_log_line(&line) {
            println!("{text}");
        }
    }
}

/// Split a log payload into printable lines prefixed with the
/// container name. Blank lines are dropped and stderr output is marked
/// with `!`.
pub fn format_log_line(line: &LogLine) -> Vec<String> {
    let marker = match line.stream.as_deref() {
        Some("stderr") => "! ",
        _ => "",
    };
    line.line
        .lines()
        .filter(|text| !text.trim().is_empty())
        .map(|text| format!("[{}] {marker}{text}", line.container))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(text: &str, stream: Option<&str>) -> LogLine {
        LogLine {
            container: "mc-01".into(),
            line: text.into(),
            stream: stream.map(str::to_string),
            timestamp: None,
        }
    }

    #[test]
    fn multi_line_payload_is_split() {
        assert_eq!(
            format_log_line(&log("Starting\r\n\nDone (3.2s)!\n", None)),
            vec!["[mc-01] Starting", "[mc-01] Done (3.2s)!"]
        );
    }

    #[test]
    fn stderr_lines_are_marked() {
        assert_eq!(
            format_log_line(&log("Can't keep up!", Some("stderr"))),
            vec!["[mc-01] ! Can't keep up!"]
        );
    }
}
