//! Typed command table.
//!
//! Each command declares the packet kinds of its arguments and of its
//! optional result. The dispatcher reads exactly that many argument packets,
//! checks their kinds and then calls the handler with a [`Request`].

use std::collections::{BTreeMap, VecDeque};
use std::fmt::{self, Write as _};
use std::sync::Arc;

use cf_controls::{BlockKind, ControlError, Options, SignalValue};
use cf_core::period_from_secs;
use cf_runtime::{Controller, RuntimeError, RuntimeResult, Section};
use serde_json::Value;

use crate::packet::{
    Packet, TAG_ARRAY, TAG_DOUBLE, TAG_INT, TAG_JSON, TAG_STR,
};

/// Kind of an argument or result packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    Str,
    Double,
    Int,
    Array,
    Json,
}

impl ArgKind {
    /// Packet tag an argument of this kind travels under.
    pub fn tag(self) -> u8 {
        match self {
            ArgKind::Str => TAG_STR,
            ArgKind::Double => TAG_DOUBLE,
            ArgKind::Int => TAG_INT,
            ArgKind::Array => TAG_ARRAY,
            ArgKind::Json => TAG_JSON,
        }
    }

    /// Whether `packet` can fill an argument of this kind.
    pub fn matches(self, packet: &Packet) -> bool {
        packet.tag() == self.tag()
    }
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag() as char)
    }
}

/// Arguments and context handed to a command handler.
pub struct Request<'a> {
    pub controller: &'a Controller,
    pub table: &'a CommandTable,
    args: VecDeque<Packet>,
}

fn bad_arg(expected: &str, got: Option<&Packet>) -> RuntimeError {
    let got = got.map_or("nothing".to_string(), |p| format!("'{}'", p.tag() as char));
    ControlError::config(format!("expected {expected} argument, got {got}")).into()
}

impl<'a> Request<'a> {
    /// Wrap the decoded argument packets of one request.
    pub fn new(controller: &'a Controller, table: &'a CommandTable, args: Vec<Packet>) -> Self {
        Self {
            controller,
            table,
            args: args.into(),
        }
    }

    /// Take the next argument as a string.
    pub fn str(&mut self) -> RuntimeResult<String> {
        match self.args.pop_front() {
            Some(Packet::Str(s)) => Ok(s),
            other => Err(bad_arg("string", other.as_ref())),
        }
    }

    /// Take the next argument as a double.
    pub fn double(&mut self) -> RuntimeResult<f64> {
        match self.args.pop_front() {
            Some(Packet::Double(x)) => Ok(x),
            other => Err(bad_arg("double", other.as_ref())),
        }
    }

    /// Take the next argument as an integer.
    pub fn int(&mut self) -> RuntimeResult<i64> {
        match self.args.pop_front() {
            Some(Packet::Int(n)) => Ok(n),
            other => Err(bad_arg("integer", other.as_ref())),
        }
    }

    /// Take the next argument as a signal value.
    pub fn signal(&mut self) -> RuntimeResult<SignalValue> {
        match self.args.pop_front() {
            Some(p @ Packet::Array(_)) => p
                .into_signal()
                .ok_or_else(|| bad_arg("array", None)),
            other => Err(bad_arg("array", other.as_ref())),
        }
    }

    /// Take the next argument as a JSON document.
    pub fn json(&mut self) -> RuntimeResult<Value> {
        match self.args.pop_front() {
            Some(Packet::Json(v)) => Ok(v),
            other => Err(bad_arg("document", other.as_ref())),
        }
    }

    /// A document holding a list of signal names.
    pub fn names(&mut self) -> RuntimeResult<Vec<String>> {
        serde_json::from_value(self.json()?)
            .map_err(|e| ControlError::config(format!("expected a list of signal names: {e}")).into())
    }

    /// Take the next argument as block options.
    pub fn options(&mut self) -> RuntimeResult<Options> {
        Ok(Options::from_json(self.json()?)?)
    }

    /// Take the next argument as a block description.
    pub fn block(&mut self) -> RuntimeResult<BlockKind> {
        Ok(BlockKind::from_json(self.json()?)?)
    }
}

pub type Handler = Arc<dyn Fn(&mut Request<'_>) -> RuntimeResult<Option<Packet>> + Send + Sync>;

/// One entry of the command table.
#[derive(Clone)]
pub struct Command {
    pub code: u8,
    pub name: &'static str,
    pub args: Vec<ArgKind>,
    pub result: Option<ArgKind>,
    pub help: String,
    pub handler: Handler,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("code", &(self.code as char))
            .field("name", &self.name)
            .field("args", &self.args)
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}

impl Command {
    /// Create a new command with its argument list and handler.
    pub fn new<F>(
        code: u8,
        name: &'static str,
        args: &[ArgKind],
        result: Option<ArgKind>,
        help: &str,
        handler: F,
    ) -> Self
    where
        F: Fn(&mut Request<'_>) -> RuntimeResult<Option<Packet>> + Send + Sync + 'static,
    {
        Self {
            code,
            name,
            args: args.to_vec(),
            result,
            help: help.to_string(),
            handler: Arc::new(handler),
        }
    }

    /// `code(args) -> result`, e.g. `F(SKKK)`.
    pub fn signature(&self) -> String {
        let args: String = self.args.iter().map(ArgKind::to_string).collect();
        let result = self.result.map_or(String::new(), |r| format!(" -> {r}"));
        format!("{}({}){}", self.code as char, args, result)
    }
}

/// Command code to command.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    commands: BTreeMap<u8, Command>,
}

impl CommandTable {
    /// Table holding every built-in command.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a command; returns the command previously bound to
    /// the same code.
    pub fn register(&mut self, command: Command) -> Option<Command> {
        self.commands.insert(command.code, command)
    }

    /// Get the command registered under `code`.
    pub fn get(&self, code: u8) -> Option<&Command> {
        self.commands.get(&code)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Commands in code order.
    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.values()
    }

    /// Listing of every command, or the description of one.
    pub fn help(&self, code: Option<u8>) -> RuntimeResult<String> {
        match code {
            None => {
                let mut out = String::from("> Controller commands\n");
                for cmd in self.commands() {
                    let _ = writeln!(out, "  {:<12} {}", cmd.signature(), cmd.name);
                }
                Ok(out)
            }
            Some(code) => match self.get(code) {
                Some(cmd) => Ok(format!("{}: {}\n{}", cmd.signature(), cmd.name, cmd.help)),
                None => Err(ControlError::not_found("command", (code as char).to_string()).into()),
            },
        }
    }

    /// The standard controller commands.
    pub fn standard() -> Self {
        use ArgKind::*;

        let mut table = Self::new();
        let mut add = |cmd: Command| {
            table.register(cmd);
        };

        add(Command::new(
            b'h',
            "help",
            &[Str],
            Some(Str),
            "List all commands, or describe the command whose code is given.",
            |req| {
                let code = req.str()?;
                let code = code.bytes().next();
                Ok(Some(Packet::Str(req.table.help(code)?)))
            },
        ));
        add(Command::new(
            b'i',
            "info",
            &[Str],
            Some(Str),
            "Describe the controller: all, summary, signals, sources, filters or sinks.",
            |req| {
                let what = req.str()?;
                let what = if what.is_empty() { "all" } else { what.as_str() };
                Ok(Some(Packet::Str(req.controller.info(what)?)))
            },
        ));

        add(Command::new(b'G', "add_signal", &[Str], None, "Add a signal.", |req| {
            let name = req.str()?;
            req.controller.add_signal(&name)?;
            Ok(None)
        }));
        add(Command::new(
            b'A',
            "set_signal",
            &[Str, Double],
            None,
            "Set a signal to a scalar value.",
            |req| {
                let name = req.str()?;
                let value = req.double()?;
                req.controller.set_signal(&name, value)?;
                Ok(None)
            },
        ));
        add(Command::new(
            b'g',
            "get_signal",
            &[Str],
            Some(Array),
            "Current value of a signal.",
            |req| {
                let name = req.str()?;
                Ok(Some(Packet::signal(&req.controller.get_signal(&name)?)))
            },
        ));
        add(Command::new(
            b'L',
            "remove_signal",
            &[Str],
            None,
            "Remove a signal no block uses.",
            |req| {
                let name = req.str()?;
                req.controller.remove_signal(&name)?;
                Ok(None)
            },
        ));

        add(Command::new(
            b'O',
            "add_source",
            &[Str, Json, Json],
            None,
            "Add a source: name, block description, output signal names.",
            |req| {
                let name = req.str()?;
                let kind = req.block()?;
                let outputs = req.names()?;
                req.controller.add_block_from_kind(
                    Section::Source,
                    &name,
                    kind,
                    &[] as &[&str],
                    outputs.as_slice(),
                )?;
                Ok(None)
            },
        ));
        add(Command::new(
            b'F',
            "add_filter",
            &[Str, Json, Json, Json],
            None,
            "Add a filter: name, block description, input and output signal names.",
            |req| {
                let name = req.str()?;
                let kind = req.block()?;
                let inputs = req.names()?;
                let outputs = req.names()?;
                req.controller.add_block_from_kind(
                    Section::Filter,
                    &name,
                    kind,
                    inputs.as_slice(),
                    outputs.as_slice(),
                )?;
                Ok(None)
            },
        ));
        add(Command::new(
            b'S',
            "add_sink",
            &[Str, Json, Json],
            None,
            "Add a sink: name, block description, input signal names.",
            |req| {
                let name = req.str()?;
                let kind = req.block()?;
                let inputs = req.names()?;
                req.controller.add_block_from_kind(
                    Section::Sink,
                    &name,
                    kind,
                    inputs.as_slice(),
                    &[] as &[&str],
                )?;
                Ok(None)
            },
        ));

        for (code, section, verb) in [
            (b'U', Section::Source, "set_source"),
            (b'T', Section::Filter, "set_filter"),
            (b'I', Section::Sink, "set_sink"),
        ] {
            add(Command::new(
                code,
                verb,
                &[Str, Json],
                None,
                "Apply options to a block; `reset` and `enabled` apply to every block.",
                move |req| {
                    let name = req.str()?;
                    let options = req.options()?;
                    req.controller.set_block(section, &name, options)?;
                    Ok(None)
                },
            ));
        }
        for (code, section, verb) in [
            (b'R', Section::Source, "remove_source"),
            (b'E', Section::Filter, "remove_filter"),
            (b'K', Section::Sink, "remove_sink"),
        ] {
            add(Command::new(code, verb, &[Str], None, "Remove a block.", move |req| {
                let name = req.str()?;
                req.controller.remove_block(section, &name)?;
                Ok(None)
            }));
        }
        for (code, section, verb) in [
            (b'Q', Section::Source, "read_source"),
            (b'N', Section::Sink, "read_sink"),
        ] {
            add(Command::new(
                code,
                verb,
                &[Str],
                Some(Array),
                "Read a block directly. Several outputs are returned concatenated.",
                move |req| {
                    let name = req.str()?;
                    let values = req.controller.read_block(section, &name)?;
                    let value = match <[SignalValue; 1]>::try_from(values) {
                        Ok([single]) => single,
                        Err(values) => SignalValue::concat(&values),
                    };
                    Ok(Some(Packet::signal(&value)))
                },
            ));
        }

        add(Command::new(b's', "start", &[], None, "Start the controller.", |req| {
            req.controller.start()?;
            Ok(None)
        }));
        add(Command::new(
            b't',
            "stop",
            &[],
            None,
            "Stop the controller after the current tick.",
            |req| {
                req.controller.stop()?;
                Ok(None)
            },
        ));
        add(Command::new(
            b'p',
            "get_period",
            &[],
            Some(Double),
            "Tick period in seconds.",
            |req| Ok(Some(Packet::Double(req.controller.get_period().as_secs_f64()))),
        ));
        add(Command::new(
            b'P',
            "set_period",
            &[Double],
            None,
            "Set the tick period in seconds; only while stopped.",
            |req| {
                let secs = req.double()?;
                let period = period_from_secs(secs).map_err(ControlError::from)?;
                req.controller.set_period(period)?;
                Ok(None)
            },
        ));

        table
    }
}
