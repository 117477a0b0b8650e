//! Feature files: discovery, and parsing through the `gherkin` crate into the
//! flat scenario list the runner executes.
//!
//! Scenario outlines become one scenario per example row with `<column>`
//! placeholders filled in. Rules are flattened; a rule's background runs after
//! the feature's. Doc strings and data tables are parsed but not passed to
//! step handlers.

use glob::{MatchOptions, Pattern};
use gherkin::GherkinEnv;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{E2eError, E2eResult};
use crate::steps::StepKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    /// Keyword as written (`And`, `Given`, ...).
    pub keyword: String,
    /// Effective kind after `And`/`But` inheritance.
    pub kind: StepKind,
    /// Step text without the keyword.
    pub text: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scenario {
    pub name: String,
    /// Feature, rule, scenario and example tags, without the `@`.
    pub tags: Vec<String>,
    /// Background of the enclosing rule, if any.
    pub background: Vec<Step>,
    pub steps: Vec<Step>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feature {
    pub name: String,
    pub description: String,
    pub path: PathBuf,
    pub tags: Vec<String>,
    pub background: Vec<Step>,
    pub scenarios: Vec<Scenario>,
}

impl Feature {
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    pub fn parse(source: &str, path: &Path) -> E2eResult<Self> {
        let file = path.display().to_string();
        let parsed = gherkin::Feature::parse(source, GherkinEnv::default()).map_err(|e| {
            E2eError::FeatureParse {
                file: file.clone(),
                reason: e.to_string(),
            }
        })?;

        let tags = strip_tags(&parsed.tags);
        let mut scenarios = Vec::new();
        for scenario in &parsed.scenarios {
            scenarios.extend(flatten(&file, scenario, &tags, &[])?);
        }
        for rule in &parsed.rules {
            let rule_tags: Vec<String> = tags.iter().cloned().chain(strip_tags(&rule.tags)).collect();
            let rule_background = rule
                .background
                .as_ref()
                .map(|b| convert_steps(&b.steps))
                .unwrap_or_default();
            for scenario in &rule.scenarios {
                scenarios.extend(flatten(&file, scenario, &rule_tags, &rule_background)?);
            }
        }

        Ok(Feature {
            name: parsed.name.trim().to_string(),
            description: parsed
                .description
                .as_deref()
                .map(|d| d.trim().to_string())
                .unwrap_or_default(),
            path: path.to_path_buf(),
            tags,
            background: parsed
                .background
                .as_ref()
                .map(|b| convert_steps(&b.steps))
                .unwrap_or_default(),
            scenarios,
        })
    }

    /// Steps a scenario runs: backgrounds first, then its own.
    pub fn steps_of<'a>(&'a self, scenario: &'a Scenario) -> impl Iterator<Item = &'a Step> {
        self.background
            .iter()
            .chain(scenario.background.iter())
            .chain(scenario.steps.iter())
    }

    /// Every step line in the file.
    pub fn step_texts(&self) -> impl Iterator<Item = &str> {
        self.background
            .iter()
            .chain(
                self.scenarios
                    .iter()
                    .flat_map(|s| s.background.iter().chain(s.steps.iter())),
            )
            .map(|s| s.text.as_str())
    }
}

fn strip_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .map(|t| t.trim_start_matches('@').to_string())
        .collect()
}

fn convert_steps(steps: &[gherkin::Step]) -> Vec<Step> {
    steps
        .iter()
        .map(|step| Step {
            keyword: step.keyword.trim().to_string(),
            kind: match step.ty {
                gherkin::StepType::Given => StepKind::Given,
                gherkin::StepType::When => StepKind::When,
                gherkin::StepType::Then => StepKind::Then,
            },
            text: step.value.trim().to_string(),
            line: step.position.line,
        })
        .collect()
}

/// A plain scenario as is, an outline as one scenario per example row.
fn flatten(
    file: &str,
    scenario: &gherkin::Scenario,
    inherited_tags: &[String],
    background: &[Step],
) -> E2eResult<Vec<Scenario>> {
    let mut tags = inherited_tags.to_vec();
    tags.extend(strip_tags(&scenario.tags));
    let steps = convert_steps(&scenario.steps);
    let name = scenario.name.trim().to_string();

    if scenario.examples.is_empty() {
        return Ok(vec![Scenario {
            name,
            tags,
            background: background.to_vec(),
            steps,
            line: scenario.position.line,
        }]);
    }

    let mut expanded = Vec::new();
    for examples in &scenario.examples {
        let Some(table) = examples.table.as_ref() else {
            continue;
        };
        let Some((header, rows)) = table.rows.split_first() else {
            continue;
        };
        let mut example_tags = tags.clone();
        example_tags.extend(strip_tags(&examples.tags));

        for (index, row) in rows.iter().enumerate() {
            if row.len() != header.len() {
                return Err(E2eError::FeatureParse {
                    file: file.to_string(),
                    reason: format!(
                        "line {}: example row {} of '{}' has {} cells, header has {}",
                        examples.position.line,
                        index + 1,
                        name,
                        row.len(),
                        header.len()
                    ),
                });
            }
            let fill = |text: &str| {
                header.iter().zip(row).fold(text.to_string(), |acc, (column, value)| {
                    acc.replace(&format!("<{}>", column.trim()), value.trim())
                })
            };
            let number = expanded.len() + 1;
            expanded.push(Scenario {
                name: format!("{} (example {})", fill(&name), number),
                tags: example_tags.clone(),
                background: background.to_vec(),
                steps: steps
                    .iter()
                    .map(|step| Step {
                        text: fill(&step.text),
                        ..step.clone()
                    })
                    .collect(),
                line: scenario.position.line,
            });
        }
    }
    Ok(expanded)
}

/// Expand `{a,b}` alternatives, which `glob` does not understand.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };
    let Some(close) = pattern[open..].find('}').map(|c| open + c) else {
        return vec![pattern.to_string()];
    };

    let (head, alternatives, tail) = (
        &pattern[..open],
        &pattern[open + 1..close],
        &pattern[close + 1..],
    );
    alternatives
        .split(',')
        .flat_map(|alt| expand_braces(&format!("{}{}{}", head, alt, tail)))
        .collect()
}

/// Include/exclude glob set, matched against paths relative to the search root.
#[derive(Debug, Clone)]
pub struct SpecMatcher {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl SpecMatcher {
    const OPTIONS: MatchOptions = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    pub fn new(include: &[String], exclude: &[String]) -> E2eResult<Self> {
        let compile = |patterns: &[String]| -> E2eResult<Vec<Pattern>> {
            patterns
                .iter()
                .flat_map(|p| expand_braces(p))
                .map(|p| Pattern::new(&p).map_err(E2eError::from))
                .collect()
        };
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    /// Excluded if the path itself or any ancestor directory matches.
    pub fn is_excluded(&self, relative: &Path) -> bool {
        relative.ancestors().any(|p| {
            !p.as_os_str().is_empty()
                && self
                    .exclude
                    .iter()
                    .any(|pattern| pattern.matches_path_with(p, Self::OPTIONS))
        })
    }

    pub fn is_included(&self, relative: &Path) -> bool {
        self.include
            .iter()
            .any(|pattern| pattern.matches_path_with(relative, Self::OPTIONS))
            && !self.is_excluded(relative)
    }

    /// Matching files under `root`, in a stable order.
    pub fn discover(&self, root: &Path) -> E2eResult<Vec<PathBuf>> {
        let mut found = Vec::new();
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
                !self.is_excluded(relative)
            });

        for entry in walker {
            let entry = entry.map_err(|e| E2eError::Io(std::io::Error::other(e.to_string())))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            if self.is_included(relative) {
                debug!("discovered {}", relative.display());
                found.push(entry.into_path());
            }
        }
        Ok(found)
    }
}

/// Discover and parse every feature file under `root`.
pub fn load_features(root: &Path, include: &[String], exclude: &[String]) -> E2eResult<Vec<Feature>> {
    let matcher = SpecMatcher::new(include, exclude)?;
    let features = matcher
        .discover(root)?
        .iter()
        .map(|path| Feature::from_file(path))
        .collect::<E2eResult<Vec<_>>>()?;
    info!(
        "Loaded {} feature(s) with {} scenario(s) from {}",
        features.len(),
        features.iter().map(|f| f.scenarios.len()).sum::<usize>(),
        root.display()
    );
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const TODO_FEATURE: &str = r#"
@todo
Feature: Todo list
  Keeps track of things to do.

  Background:
    Given I open the Todo page app

  Scenario: Add a todo
    When I add a todo with text "Buy milk"
    Then Verify last todo to match "Buy milk"

  @smoke # fast path
  Scenario: Check a todo
    When I add a todo with text "Walk dog"
    And I check the todo checkbox with index 0
    Then Verify checkbox with index 0 to be checked
    But Verify remaining text to match "0 of 1"
"#;

    fn parse(source: &str) -> E2eResult<Feature> {
        Feature::parse(source, Path::new("todo.feature"))
    }

    #[test]
    fn test_parse_todo_feature() {
        let feature = parse(TODO_FEATURE).unwrap();
        assert_eq!(feature.name, "Todo list");
        assert_eq!(feature.description, "Keeps track of things to do.");
        assert_eq!(feature.tags, vec!["todo".to_string()]);
        assert_eq!(feature.background.len(), 1);
        assert_eq!(feature.scenarios.len(), 2);

        let check = &feature.scenarios[1];
        assert_eq!(check.name, "Check a todo");
        assert_eq!(check.tags, vec!["todo".to_string(), "smoke".to_string()]);
        assert_eq!(check.steps[1].keyword, "And");
        assert_eq!(check.steps[1].kind, StepKind::When);
        assert_eq!(check.steps[3].kind, StepKind::Then);
        assert_eq!(check.steps[1].text, "I check the todo checkbox with index 0");

        let steps: Vec<&str> = feature.steps_of(check).map(|s| s.text.as_str()).collect();
        assert_eq!(steps[0], "I open the Todo page app");
        assert_eq!(steps.len(), 5);
        assert_eq!(feature.step_texts().count(), 7);
    }

    #[test]
    fn test_outline_expands_examples() {
        let feature = parse(
            r#"
Feature: Outlines
  Background:
    Given I open the Todo page app

  @add
  Scenario Outline: Add <text>
    When I add a todo with text "<text>"
    Then Verify remaining text to match "<left>"

    Examples:
      | text      | left   |
      | Buy milk  | 1 of 1 |
      | Walk dog  | 1 of 1 |
"#,
        )
        .unwrap();

        assert_eq!(feature.scenarios.len(), 2);
        let second = &feature.scenarios[1];
        assert_eq!(second.name, "Add Walk dog (example 2)");
        assert_eq!(second.tags, vec!["add".to_string()]);
        assert_eq!(second.steps[0].text, "I add a todo with text \"Walk dog\"");
        assert_eq!(second.steps[1].text, "Verify remaining text to match \"1 of 1\"");
        assert_eq!(feature.steps_of(second).count(), 3);
    }

    #[test]
    fn test_rule_background_runs_after_feature_background() {
        let feature = parse(
            r#"
Feature: Rules
  Background:
    Given I open the Todo page app

  @list
  Rule: Adding
    Background:
      When I add a todo with text "First"

    Scenario: Second item
      When I add a todo with text "Second"
      Then Verify last todo to match "Second"
"#,
        )
        .unwrap();

        let scenario = &feature.scenarios[0];
        assert_eq!(scenario.tags, vec!["list".to_string()]);
        let steps: Vec<&str> = feature.steps_of(scenario).map(|s| s.text.as_str()).collect();
        assert_eq!(
            steps,
            vec![
                "I open the Todo page app",
                "I add a todo with text \"First\"",
                "I add a todo with text \"Second\"",
                "Verify last todo to match \"Second\"",
            ]
        );
        assert_eq!(feature.step_texts().count(), 4);
    }

    #[test_case("Scenario: x\n  Given y\n" ; "missing feature")]
    #[test_case("just some words\n" ; "no keywords")]
    fn test_parse_errors(source: &str) {
        assert!(matches!(parse(source), Err(E2eError::FeatureParse { .. })));
    }

    #[test]
    fn test_ragged_example_row_rejected() {
        let err = parse(
            "Feature: f\n  Scenario Outline: s\n    Given <a>\n\n    Examples:\n      | a | b |\n      | 1 |\n",
        )
        .unwrap_err();
        assert!(matches!(err, E2eError::FeatureParse { .. }));
    }

    #[test_case("**/features/*.{feature,features}", &["**/features/*.feature", "**/features/*.features"] ; "one group")]
    #[test_case("{a,b}/{c,d}", &["a/c", "a/d", "b/c", "b/d"] ; "two groups")]
    #[test_case("plain/*.feature", &["plain/*.feature"] ; "no braces")]
    fn test_expand_braces(pattern: &str, expected: &[&str]) {
        assert_eq!(expand_braces(pattern), expected);
    }

    #[test]
    fn test_matcher_include_and_exclude() {
        let matcher = SpecMatcher::new(
            &["**/features/*.{feature,features}".to_string()],
            &["**/pages/*".to_string()],
        )
        .unwrap();

        assert!(matcher.is_included(Path::new("tests/features/todo.feature")));
        assert!(matcher.is_included(Path::new("features/todo.features")));
        assert!(!matcher.is_included(Path::new("tests/features/todo.md")));
        assert!(!matcher.is_included(Path::new("tests/features/nested/todo.feature")));
        assert!(matcher.is_excluded(Path::new("e2e/pages/todoPage/todoPage.feature")));
        assert!(!matcher.is_included(Path::new("e2e/pages/features/x.feature")));
    }

    #[test]
    fn test_discover_walks_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for path in [
            "tests/features/b.feature",
            "tests/features/a.feature",
            "tests/features/readme.txt",
            "pages/features/helper.feature",
        ] {
            let full = root.join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(&full, "Feature: x").unwrap();
        }

        let matcher = SpecMatcher::new(
            &["**/features/*.feature".to_string()],
            &["**/pages".to_string()],
        )
        .unwrap();
        let found: Vec<PathBuf> = matcher
            .discover(root)
            .unwrap()
            .into_iter()
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();

        assert_eq!(
            found,
            vec![
                PathBuf::from("tests/features/a.feature"),
                PathBuf::from("tests/features/b.feature"),
            ]
        );
    }
}
