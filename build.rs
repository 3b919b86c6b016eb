use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Directories holding this crate's own Rust sources. Anything else in the
// tree is not subject to the policy.
const SOURCE_ROOTS: [&str; 3] = ["semisep", "tests", "benches"];

// What a rule does with a line the regex matched.
#[derive(Clone, Copy)]
enum LineFilter {
    // Report unless the match sits in a comment or a string literal.
    CodeOnly,
    // Report every match.
    Always,
    // Report unless the line is a doc comment.
    SkipDocComments,
    // Report only comments whose letters are all uppercase.
    ShoutingComment,
}

struct Rule {
    pattern: &'static str,
    filter: LineFilter,
    description: &'static str,
    advice: &'static str,
}

const RULES: [Rule; 5] = [
    Rule {
        pattern: r"\b(_[a-zA-Z0-9_]+)\b",
        filter: LineFilter::CodeOnly,
        description: "underscore-prefixed identifiers",
        advice: "Either use the variable (removing the underscore) or remove it completely.",
    },
    Rule {
        pattern: r"(//|/\*|///).*(?:FIXED|CORRECTED|FIX|FIXES|NEW|CHANGED|CHANGES|CHANGE|MODIFIED|MODIFIES|MODIFY|UPDATED|UPDATES|UPDATE)",
        filter: LineFilter::Always,
        description: "comments narrating edits",
        advice: "Comments describe the code as it is. Remove them rather than commenting them out.",
    },
    Rule {
        pattern: r"(//|/\*).*\*\*",
        filter: LineFilter::SkipDocComments,
        description: "'**' in regular comments",
        advice: "Emphasis markup belongs in doc comments only.",
    },
    Rule {
        pattern: r"(//|/\*|///).*",
        filter: LineFilter::ShoutingComment,
        description: "comments with all uppercase alphabetic characters",
        advice: "Strongly consider deleting the comment completely.",
    },
    Rule {
        pattern: r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
        filter: LineFilter::Always,
        description: "#[allow(dead_code)] attributes",
        advice: "Either use the code (removing the attribute) or remove it completely.",
    },
];

// Collects the offending lines of a single file for one rule.
struct ViolationCollector {
    filter: LineFilter,
    violations: Vec<String>,
}

impl ViolationCollector {
    fn new(filter: LineFilter) -> Self {
        Self {
            filter,
            violations: Vec::new(),
        }
    }

    fn error_message(&self, rule: &Rule, path: &Path) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }
        let mut msg = format!(
            "\n❌ ERROR: Found {} {} in {}:\n",
            self.violations.len(),
            rule.description,
            path.display()
        );
        for violation in &self.violations {
            msg.push_str(&format!("   {violation}\n"));
        }
        msg.push_str(&format!(
            "\n⚠️ {} are not allowed in this project.\n   {}\n",
            rule.description, rule.advice
        ));
        Some(msg)
    }
}

impl Sink for ViolationCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();

        let report = match self.filter {
            LineFilter::Always => true,
            LineFilter::CodeOnly => !is_comment(line_text) && !underscore_in_string(line_text),
            LineFilter::SkipDocComments => !is_doc_comment(line_text),
            LineFilter::ShoutingComment => comment_body(line_text).is_some_and(is_all_caps),
        };
        if report {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with("//") || line.contains("/*")
}

fn is_doc_comment(line: &str) -> bool {
    line.trim_start().starts_with("///")
}

// Odd-numbered segments between quotes are string contents.
fn underscore_in_string(line: &str) -> bool {
    line.split('"')
        .enumerate()
        .any(|(i, part)| i % 2 == 1 && part.contains('_'))
}

fn comment_body(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix("///") {
        return Some(rest.trim());
    }
    if let Some(rest) = trimmed.strip_prefix("//") {
        return Some(rest.trim());
    }
    let start = line.find("/*")? + 2;
    let body = &line[start..];
    Some(match body.find("*/") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    })
}

fn is_all_caps(text: &str) -> bool {
    let mut letters = text.chars().filter(|c| c.is_alphabetic()).peekable();
    letters.peek().is_some() && letters.all(|c| c.is_uppercase())
}

fn rust_sources() -> Vec<PathBuf> {
    SOURCE_ROOTS
        .iter()
        .flat_map(|root| WalkDir::new(root).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
        .collect()
}

fn scan(rule: &Rule, sources: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(rule.pattern)?;
    let mut searcher = Searcher::new();
    for path in sources {
        let mut collector = ViolationCollector::new(rule.filter);
        searcher.search_path(&matcher, path, &mut collector)?;
        if let Some(msg) = collector.error_message(rule, path) {
            return Err(msg.into());
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for root in SOURCE_ROOTS {
        println!("cargo:rerun-if-changed={root}");
    }

    let sources = rust_sources();
    for rule in &RULES {
        if let Err(e) = scan(rule, &sources) {
            // Shown in cargo's output before the build fails.
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
