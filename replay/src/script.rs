//! Replay scripts: one analytics call per line.
//!
//! ```text
//! # comment
//! add <name> [@namespace] [key=value ...]
//! start <name> [@namespace] [key=value ...]
//! pause <name> [@namespace]
//! resume <name> [@namespace]
//! end <name> [@namespace] [key=value ...]
//! advance <amount>          # 250ms, 2s, or plain milliseconds
//! flush
//! ```

use log::debug;
use maas_analytics::{MaaSAnalytics, ManualClock};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    pub name: String,
    pub namespace: Option<String>,
    pub parameters: Vec<(String, String)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Add(Call),
    Start(Call),
    Pause(Call),
    Resume(Call),
    End(Call),
    Advance(Duration),
    Flush,
}

pub fn parse(source: &str) -> Result<Vec<Command>, ParseError> {
    let mut commands = Vec::new();

    for (index, line) in source.lines().enumerate() {
        let line_no = index + 1;
        let line = match line.find('#') {
            Some(pos) => &line[..pos],
            None => line,
        };
        let mut words = line.split_whitespace();
        let verb = match words.next() {
            Some(verb) => verb,
            None => continue,
        };
        let rest: Vec<&str> = words.collect();
        let error = |message: String| ParseError {
            line: line_no,
            message,
        };

        let command = match verb {
            "add" => Command::Add(parse_call(&rest, true).map_err(error)?),
            "start" => Command::Start(parse_call(&rest, true).map_err(error)?),
            "end" => Command::End(parse_call(&rest, true).map_err(error)?),
            "pause" => Command::Pause(parse_call(&rest, false).map_err(error)?),
            "resume" => Command::Resume(parse_call(&rest, false).map_err(error)?),
            "advance" => match rest.as_slice() {
                [amount] => Command::Advance(parse_duration(amount).map_err(error)?),
                _ => return Err(error("`advance` takes exactly one amount".to_owned())),
            },
            "flush" if rest.is_empty() => Command::Flush,
            "flush" => return Err(error("`flush` takes no arguments".to_owned())),
            other => return Err(error(format!("unknown command {:?}", other))),
        };
        commands.push(command);
    }

    Ok(commands)
}

fn parse_call(words: &[&str], allow_parameters: bool) -> Result<Call, String> {
    let (name, rest) = match words.split_first() {
        Some((name, rest)) => (name.to_string(), rest),
        None => return Err("missing event name".to_owned()),
    };

    let mut call = Call {
        name,
        namespace: None,
        parameters: Vec::new(),
    };

    for word in rest {
        if let Some(namespace) = word.strip_prefix('@') {
            if call.namespace.is_some() {
                return Err(format!("namespace given twice for {:?}", call.name));
            }
            call.namespace = Some(namespace.to_owned());
        } else if let Some((key, value)) = word.split_once('=') {
            if !allow_parameters {
                return Err(format!("unexpected parameter {:?}", word));
            }
            call.parameters.push((key.to_owned(), value.to_owned()));
        } else {
            return Err(format!("expected `@namespace` or `key=value`, found {:?}", word));
        }
    }

    Ok(call)
}

/// Longest single step the clock can take: its offsets are `u64` nanoseconds.
const MAX_ADVANCE: Duration = Duration::from_nanos(u64::MAX);

fn parse_duration(amount: &str) -> Result<Duration, String> {
    let invalid = || format!("invalid amount of time {:?}", amount);
    let duration = if let Some(ms) = amount.strip_suffix("ms") {
        ms.parse().map(Duration::from_millis).map_err(|_| invalid())?
    } else if let Some(secs) = amount.strip_suffix('s') {
        secs.parse::<f64>()
            .ok()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .ok_or_else(invalid)?
    } else {
        amount.parse().map(Duration::from_millis).map_err(|_| invalid())?
    };

    if duration > MAX_ADVANCE {
        return Err(format!("amount of time {:?} is too large", amount));
    }
    Ok(duration)
}

/// Runs `commands` against `client`, moving `clock` forward on `advance`.
/// Returns the number of events delivered by `flush` commands.
pub fn execute(
    client: &MaaSAnalytics,
    clock: &ManualClock,
    commands: &[Command],
) -> maas_analytics::Result<usize> {
    let mut flushed = 0;

    for command in commands {
        debug!("replaying {:?}", command);
        match command {
            Command::Add(call) => match &call.namespace {
                Some(ns) => client.add_event_with_parameters_in(&call.name, pairs(call), ns),
                None => client.add_event_with_parameters(&call.name, pairs(call)),
            },
            Command::Start(call) => match &call.namespace {
                Some(ns) => client.start_timed_event_with_parameters_in(&call.name, pairs(call), ns),
                None => client.start_timed_event_with_parameters(&call.name, pairs(call)),
            },
            Command::Pause(call) => match &call.namespace {
                Some(ns) => client.pause_timed_event_in(&call.name, ns),
                None => client.pause_timed_event(&call.name),
            },
            Command::Resume(call) => match &call.namespace {
                Some(ns) => client.resume_timed_event_in(&call.name, ns),
                None => client.resume_timed_event(&call.name),
            },
            Command::End(call) => match &call.namespace {
                Some(ns) => client.end_timed_event_with_parameters_in(&call.name, pairs(call), ns),
                None => client.end_timed_event_with_parameters(&call.name, pairs(call)),
            },
            Command::Advance(by) => clock.advance(*by),
            Command::Flush => flushed += client.flush()?,
        }
    }

    Ok(flushed)
}

fn pairs(call: &Call) -> impl Iterator<Item = (&str, &str)> + '_ {
    call.parameters
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
}
