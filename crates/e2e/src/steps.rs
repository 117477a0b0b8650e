//! Step registry: typed step patterns bound to handlers.
//!
//! Patterns are Cucumber Expressions, compiled to regexes by the
//! `cucumber-expressions` crate. Optional text `(s)` and alternatives `a/b`
//! work as in Cucumber. Parameters are parsed into typed arguments:
//!
//! | parameter   | matches                         | parsed as            |
//! |-------------|---------------------------------|----------------------|
//! | `{string}`  | `"double"` or `'single'` quoted | [`StepArg::Str`]     |
//! | `{int}`     | an integer                      | [`StepArg::Int`]     |
//! | `{float}`   | a decimal number                | [`StepArg::Float`]   |
//! | `{word}`    | a run of non-space characters   | [`StepArg::Word`]    |
//! | `{}`        | anything                        | [`StepArg::Any`]     |
//!
//! Arguments are parsed into their typed form before the handler runs, so a
//! handler only ever sees well-formed values.
//!
//! The registry is a plain value built at startup and handed to the runner.
//! Every step line must resolve to exactly one definition; [`StepRegistry::validate`]
//! checks that for all discovered scenarios before anything executes.

use cucumber_expressions::Expression;
use futures::future::BoxFuture;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{E2eError, E2eResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Given,
    When,
    Then,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StepKind::Given => "Given",
            StepKind::When => "When",
            StepKind::Then => "Then",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamType {
    String,
    Int,
    Float,
    Word,
    Any,
}

impl ParamType {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(ParamType::String),
            "int" => Some(ParamType::Int),
            "float" => Some(ParamType::Float),
            "word" => Some(ParamType::Word),
            "" => Some(ParamType::Any),
            _ => None,
        }
    }

    /// Capture groups the compiled parameter occupies.
    fn group_count(name: &str) -> Result<usize, String> {
        Expression::regex(&format!("{{{}}}", name))
            .map(|regex| regex.captures_len() - 1)
            .map_err(|e| e.to_string())
    }
}

/// Parameter names in order of appearance, skipping `\{` escapes.
fn parameter_names(expression: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut escaped = false;
    let mut open = None;
    for (i, c) in expression.char_indices() {
        match (escaped, c) {
            (true, _) => escaped = false,
            (false, '\\') => escaped = true,
            (false, '{') => open = Some(i + 1),
            (false, '}') => {
                if let Some(start) = open.take() {
                    names.push(&expression[start..i]);
                }
            }
            _ => {}
        }
    }
    names
}

/// Drop the quotes around a `{string}` capture and unescape the quote char.
fn unquote(raw: &str) -> String {
    for quote in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return raw[1..raw.len() - 1].replace(&format!("\\{}", quote), &quote.to_string());
        }
    }
    raw.to_string()
}

/// A parsed step argument.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StepArg {
    Str(String),
    Int(i64),
    Float(f64),
    Word(String),
    Any(String),
}

impl fmt::Display for StepArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepArg::Str(s) => write!(f, "{:?}", s),
            StepArg::Int(n) => write!(f, "{}", n),
            StepArg::Float(x) => write!(f, "{}", x),
            StepArg::Word(s) | StepArg::Any(s) => f.write_str(s),
        }
    }
}

/// Arguments extracted from one step line, in placeholder order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StepArgs(Vec<StepArg>);

impl StepArgs {
    pub fn new(args: Vec<StepArg>) -> Self {
        Self(args)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepArg> {
        self.0.iter()
    }

    fn get(&self, index: usize, expected: &'static str) -> E2eResult<&StepArg> {
        self.0.get(index).ok_or_else(|| E2eError::ArgumentType {
            index,
            expected,
            value: "<missing>".to_string(),
        })
    }

    /// Text argument; accepts `{string}`, `{word}` and `{}`.
    pub fn string(&self, index: usize) -> E2eResult<&str> {
        match self.get(index, "a string")? {
            StepArg::Str(s) | StepArg::Word(s) | StepArg::Any(s) => Ok(s),
            other => Err(E2eError::ArgumentType {
                index,
                expected: "a string",
                value: other.to_string(),
            }),
        }
    }

    /// Integer argument; `{word}` and `{}` are parsed on the spot.
    pub fn int(&self, index: usize) -> E2eResult<i64> {
        match self.get(index, "an integer")? {
            StepArg::Int(n) => Ok(*n),
            StepArg::Word(s) | StepArg::Any(s) => {
                s.trim().parse().map_err(|_| E2eError::ArgumentType {
                    index,
                    expected: "an integer",
                    value: s.clone(),
                })
            }
            other => Err(E2eError::ArgumentType {
                index,
                expected: "an integer",
                value: other.to_string(),
            }),
        }
    }

    /// Non-negative integer argument, for 0-based positions.
    pub fn index(&self, index: usize) -> E2eResult<usize> {
        let n = self.int(index)?;
        usize::try_from(n).map_err(|_| E2eError::ArgumentType {
            index,
            expected: "a non-negative index",
            value: n.to_string(),
        })
    }

    pub fn float(&self, index: usize) -> E2eResult<f64> {
        match self.get(index, "a number")? {
            StepArg::Float(x) => Ok(*x),
            StepArg::Int(n) => Ok(*n as f64),
            other => Err(E2eError::ArgumentType {
                index,
                expected: "a number",
                value: other.to_string(),
            }),
        }
    }
}

/// A compiled step expression.
#[derive(Debug, Clone)]
pub struct StepPattern {
    source: String,
    regex: Regex,
    /// Parameter type and capture group count, in order.
    params: Vec<(ParamType, usize)>,
}

impl StepPattern {
    pub fn compile(expression: &str) -> E2eResult<Self> {
        let invalid = |reason: String| E2eError::InvalidPattern {
            pattern: expression.to_string(),
            reason,
        };

        let regex = Expression::regex(expression).map_err(|e| invalid(e.to_string()))?;
        let params = parameter_names(expression)
            .into_iter()
            .map(|name| {
                let param = ParamType::parse(name)
                    .ok_or_else(|| invalid(format!("unsupported parameter type {{{}}}", name)))?;
                let groups = ParamType::group_count(name).map_err(invalid)?;
                Ok((param, groups))
            })
            .collect::<E2eResult<Vec<_>>>()?;

        let expected_groups: usize = params.iter().map(|(_, groups)| groups).sum();
        if regex.captures_len() - 1 != expected_groups {
            return Err(invalid(format!(
                "compiled to {} capture groups, parameters account for {}",
                regex.captures_len() - 1,
                expected_groups
            )));
        }

        Ok(Self {
            source: expression.to_string(),
            regex,
            params,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.captures(text).is_some()
    }

    /// Captures for a match spanning all of `text`.
    fn captures<'t>(&self, text: &'t str) -> Option<regex::Captures<'t>> {
        self.regex
            .captures(text)
            .filter(|caps| caps.get(0).is_some_and(|m| m.start() == 0 && m.end() == text.len()))
    }

    /// Match `text` and parse its arguments; `None` when it doesn't match.
    pub fn parse(&self, text: &str) -> Option<E2eResult<StepArgs>> {
        let caps = self.captures(text)?;
        let mut args = Vec::with_capacity(self.params.len());
        let mut group = 1;

        for (position, (param, groups)) in self.params.iter().enumerate() {
            let raw = (group..group + groups)
                .find_map(|g| caps.get(g))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            group += groups;

            let arg = match param {
                ParamType::String => StepArg::Str(unquote(&raw)),
                ParamType::Word => StepArg::Word(raw),
                ParamType::Any => StepArg::Any(raw),
                ParamType::Int => match raw.trim_start_matches('+').parse() {
                    Ok(n) => StepArg::Int(n),
                    Err(_) => {
                        return Some(Err(E2eError::ArgumentType {
                            index: position,
                            expected: "an integer",
                            value: raw,
                        }))
                    }
                },
                ParamType::Float => match raw.parse() {
                    Ok(x) => StepArg::Float(x),
                    Err(_) => {
                        return Some(Err(E2eError::ArgumentType {
                            index: position,
                            expected: "a number",
                            value: raw,
                        }))
                    }
                },
            };
            args.push(arg);
        }

        Some(Ok(StepArgs(args)))
    }
}

/// Step handler: borrows the scenario world for the duration of the step.
pub type StepFn<W> = for<'a> fn(&'a mut W, StepArgs) -> BoxFuture<'a, E2eResult<()>>;

pub struct StepDefinition<W> {
    pub kind: StepKind,
    pub pattern: StepPattern,
    handler: StepFn<W>,
}

impl<W> fmt::Debug for StepDefinition<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("kind", &self.kind)
            .field("pattern", &self.pattern.source)
            .finish()
    }
}

/// A resolved step ready to run.
#[derive(Debug)]
pub struct StepMatch<'r, W> {
    pub definition: &'r StepDefinition<W>,
    pub args: StepArgs,
}

impl<'r, W> StepMatch<'r, W> {
    pub async fn invoke(self, world: &mut W) -> E2eResult<()> {
        (self.definition.handler)(world, self.args).await
    }
}

pub struct StepRegistry<W> {
    steps: Vec<StepDefinition<W>>,
}

impl<W> Default for StepRegistry<W> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<W> StepRegistry<W> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn given(&mut self, expression: &str, handler: StepFn<W>) -> E2eResult<()> {
        self.register(StepKind::Given, expression, handler)
    }

    pub fn when(&mut self, expression: &str, handler: StepFn<W>) -> E2eResult<()> {
        self.register(StepKind::When, expression, handler)
    }

    pub fn then(&mut self, expression: &str, handler: StepFn<W>) -> E2eResult<()> {
        self.register(StepKind::Then, expression, handler)
    }

    /// Register a definition. The same expression twice is rejected.
    pub fn register(&mut self, kind: StepKind, expression: &str, handler: StepFn<W>) -> E2eResult<()> {
        let pattern = StepPattern::compile(expression)?;
        if let Some(existing) = self.steps.iter().find(|s| s.pattern.source == expression) {
            return Err(E2eError::PatternAmbiguity {
                step: expression.to_string(),
                patterns: vec![
                    format!("{} {}", existing.kind, existing.pattern.source),
                    format!("{} {}", kind, expression),
                ],
            });
        }
        self.steps.push(StepDefinition {
            kind,
            pattern,
            handler,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn definitions(&self) -> impl Iterator<Item = &StepDefinition<W>> {
        self.steps.iter()
    }

    /// Resolve a step line to its unique definition and parsed arguments.
    pub fn find(&self, text: &str) -> E2eResult<StepMatch<'_, W>> {
        let mut matches = self.steps.iter().filter(|s| s.pattern.is_match(text));
        let first = matches
            .next()
            .ok_or_else(|| E2eError::UndefinedStep(text.to_string()))?;

        let others: Vec<&StepDefinition<W>> = matches.collect();
        if !others.is_empty() {
            return Err(E2eError::PatternAmbiguity {
                step: text.to_string(),
                patterns: std::iter::once(first)
                    .chain(others)
                    .map(|s| format!("{} {}", s.kind, s.pattern.source))
                    .collect(),
            });
        }

        let args = first
            .pattern
            .parse(text)
            .unwrap_or_else(|| Ok(StepArgs::default()))?;
        Ok(StepMatch {
            definition: first,
            args,
        })
    }

    /// Resolve every line up front; the first unresolvable one is returned.
    pub fn validate<'t, I>(&self, lines: I) -> E2eResult<()>
    where
        I: IntoIterator<Item = &'t str>,
    {
        for line in lines {
            self.find(line)?;
        }
        Ok(())
    }
}
