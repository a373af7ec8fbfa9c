//! Per-test directive header
//!
//! A test script may start with any number of lines beginning `//!`. Each
//! is split into shell-style tokens and read as a sequence of directives
//! that shape the [`RunDescriptor`] for that script:
//!
//! ```text
//! //! no-harness
//! //! timeout: 2.5
//! //! expect-exit: 3 expect-stdout-fails
//! //! stdin: some input line
//! //! expect-stdout: hello world
//! ```

use std::path::Path;
use std::time::Duration;

use testrig_common::RunDescriptor;

use crate::error::{RunnerError, RunnerResult};

const HEADER_PREFIX: &str = "//!";

/// Read `path` and apply its directive header on top of `defaults`
pub fn parse_file(path: &Path, defaults: RunDescriptor) -> RunnerResult<RunDescriptor> {
    let text = std::fs::read_to_string(path).map_err(|source| RunnerError::ReadScript {
        path: path.to_path_buf(),
        source,
    })?;
    apply_header(defaults, &text)
}

/// Build a descriptor from the header lines at the top of `text`
pub fn parse_header(text: &str) -> RunnerResult<RunDescriptor> {
    apply_header(RunDescriptor::default(), text)
}

fn apply_header(mut descriptor: RunDescriptor, text: &str) -> RunnerResult<RunDescriptor> {
    for line in text.lines() {
        let Some(rest) = line.strip_prefix(HEADER_PREFIX) else {
            break;
        };
        apply_line(&mut descriptor, &tokenize(rest)?)?;
    }
    Ok(descriptor)
}

fn apply_line(d: &mut RunDescriptor, tokens: &[String]) -> RunnerResult<()> {
    let mut i = 0;
    while i < tokens.len() {
        let tok = tokens[i].as_str();
        match tok {
            "no-harness" => d.use_harness = false,
            "no-snakeoil" => d.use_certificates = false,
            "expect-exit-fails" => d.exit_xfail = true,
            "expect-stdout-fails" => d.stdout_xfail = true,
            "expect-stderr-fails" => d.stderr_xfail = true,
            "timeout:" => {
                let value = argument(tok, tokens, i)?;
                d.timeout = parse_timeout(value)?;
                i += 1;
            }
            "expect-exit:" => {
                let value = argument(tok, tokens, i)?;
                d.expected_exit = value.parse().map_err(|_| {
                    RunnerError::Directive(format!("invalid exit code: {value:?}"))
                })?;
                i += 1;
            }
            // The remaining directives consume the rest of the line
            "phantomjs:" => {
                argument(tok, tokens, i)?;
                d.target_args.extend_from_slice(&tokens[i + 1..]);
                return Ok(());
            }
            "script:" => {
                argument(tok, tokens, i)?;
                d.script_args.extend_from_slice(&tokens[i + 1..]);
                return Ok(());
            }
            "stdin:" => {
                argument(tok, tokens, i)?;
                d.input.extend_from_slice(tokens[i + 1..].join(" ").as_bytes());
                d.input.push(b'\n');
                return Ok(());
            }
            "expect-stdout:" => {
                argument(tok, tokens, i)?;
                d.expected_stdout.push(tokens[i + 1..].join(" "));
                return Ok(());
            }
            "expect-stderr:" => {
                argument(tok, tokens, i)?;
                d.expected_stderr.push(tokens[i + 1..].join(" "));
                return Ok(());
            }
            other => {
                return Err(RunnerError::Directive(format!(
                    "unrecognized directive: {other}"
                )))
            }
        }
        i += 1;
    }
    Ok(())
}

fn argument<'a>(tok: &str, tokens: &'a [String], i: usize) -> RunnerResult<&'a str> {
    tokens
        .get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| RunnerError::Directive(format!("{tok} directive requires an argument")))
}

fn parse_timeout(value: &str) -> RunnerResult<Duration> {
    let secs: f64 = value
        .parse()
        .map_err(|_| RunnerError::Directive(format!("invalid timeout: {value:?}")))?;
    if secs <= 0.0 || secs.is_nan() {
        return Err(RunnerError::Directive("timeout must be positive".into()));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|_| RunnerError::Directive(format!("invalid timeout: {value:?}")))
}

/// Split a header line into shell-style words.
///
/// Single quotes are literal, double quotes honour backslash escapes of
/// `"`, `\`, `$` and `` ` ``, a bare backslash escapes the next character,
/// and a `#` at the start of a word comments out the rest of the line.
pub fn tokenize(line: &str) -> RunnerResult<Vec<String>> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.peek() {
            None | Some('#') => break,
            Some(_) => {}
        }

        let mut word = String::new();
        while let Some(c) = chars.next() {
            match c {
                c if c.is_whitespace() => break,
                '\'' => loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => word.push(c),
                        None => return Err(unterminated()),
                    }
                },
                '"' => loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\' | '$' | '`')) => word.push(c),
                            Some('\n') => {}
                            Some(c) => {
                                word.push('\\');
                                word.push(c);
                            }
                            None => return Err(unterminated()),
                        },
                        Some(c) => word.push(c),
                        None => return Err(unterminated()),
                    }
                },
                '\\' => match chars.next() {
                    Some('\n') => {}
                    Some(c) => word.push(c),
                    None => return Err(RunnerError::Directive("no escaped character".into())),
                },
                c => word.push(c),
            }
        }
        tokens.push(word);
    }

    Ok(tokens)
}

fn unterminated() -> RunnerError {
    RunnerError::Directive("no closing quotation".into())
}
