//! Heuristic rules engine that sorts message text into scripts or news.
//!
//! Rules are grouped into tiers and evaluated in tier order. The first
//! matching rule decides the category and stops evaluation:
//! 1. Code evidence (fences, exploit APIs, declarations) → Scripts
//! 2. Distribution links (script repos, raw-content hosts) → Scripts
//! 3. Contextual terms ("script", "hack", ...) paired with a code token → Scripts
//!
//! Anything that matches nothing is News. A bare mention of "script" is
//! not enough on its own.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::pipeline::types::Category;

/// Length of the content preview attached to diagnostic events.
const PREVIEW_CHARS: usize = 200;

/// Priority level of a rule. Lower tiers win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    CodeEvidence = 1,
    DistributionLink = 2,
    ContextualTerm = 3,
}

impl Tier {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::CodeEvidence => "code_evidence",
            Self::DistributionLink => "distribution_link",
            Self::ContextualTerm => "contextual_term",
        }
    }

    /// Category assigned when a rule in this tier matches.
    pub fn category(&self) -> Category {
        Category::Scripts
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Built-in rule table: (tier, name, pattern).
///
/// Tier 1 runs in multi-line mode so `^`/`$` see every line. Tier 3 lets `.`
/// cross newlines, which pairs a term anywhere with a code token anywhere.
const DEFAULT_RULES: &[(Tier, &str, &str)] = &[
    (Tier::CodeEvidence, "lua code fence", r"(?im)```lua"),
    (Tier::CodeEvidence, "fence with loadstring", r"(?im)```.*loadstring"),
    (Tier::CodeEvidence, "loadstring call", r"(?im)loadstring\s*\("),
    (Tier::CodeEvidence, "game dereference", r"(?im)game\s*[:.]"),
    (Tier::CodeEvidence, "workspace dereference", r"(?im)workspace\s*[:.]"),
    (Tier::CodeEvidence, "Instance.new", r"(?im)Instance\.new"),
    (Tier::CodeEvidence, "local assignment", r"(?im)local\s+\w+\s*="),
    (Tier::CodeEvidence, "function declaration", r"(?im)function\s+\w+"),
    (Tier::CodeEvidence, "block terminator", r"(?im)\bend\s*$"),
    (Tier::CodeEvidence, "print call", r"(?im)print\s*\("),
    (Tier::CodeEvidence, "HttpGet call", r"(?im)HttpGet\s*\("),
    (Tier::CodeEvidence, "require call", r"(?im)require\s*\("),
    (Tier::CodeEvidence, "getgenv call", r"(?im)getgenv\s*\("),
    (Tier::CodeEvidence, "getsenv call", r"(?im)getsenv\s*\("),
    (Tier::CodeEvidence, "setclipboard call", r"(?im)setclipboard\s*\("),
    (Tier::CodeEvidence, "hookfunction call", r"(?im)hookfunction\s*\("),
    (Tier::CodeEvidence, "firetouchinterest call", r"(?im)firetouchinterest\s*\("),
    (Tier::CodeEvidence, "fireclickdetector call", r"(?im)fireclickdetector\s*\("),
    (Tier::CodeEvidence, "fenced block", r"(?im)```[\s\S]*?```"),
    (Tier::CodeEvidence, "tagged fenced block", r"(?im)```\w+[\s\S]*?```"),
    (
        Tier::DistributionLink,
        "script repository link",
        r"(?i)github\.com.*(?:script|hub|exploit|hack|lua)",
    ),
    (Tier::DistributionLink, "raw content link", r"(?i)raw\.githubusercontent\.com"),
    (
        Tier::ContextualTerm,
        "script before code token",
        r"(?is)\bscript\b.*(?:loadstring|function|local)",
    ),
    (
        Tier::ContextualTerm,
        "code token before script",
        r"(?is)(?:loadstring|function|local).*\bscript\b",
    ),
    (Tier::ContextualTerm, "hack with code token", r"(?is)\bhack\b.*(?:loadstring|function)"),
    (
        Tier::ContextualTerm,
        "exploit with code token",
        r"(?is)\bexploit\b.*(?:loadstring|function)",
    ),
    (Tier::ContextualTerm, "cheat with code token", r"(?is)\bcheat\b.*(?:loadstring|function)"),
];

static DEFAULT_CLASSIFIER: LazyLock<Classifier> = LazyLock::new(Classifier::default_rules);

/// Classify with the built-in rule table.
pub fn classify(content: &str) -> Category {
    DEFAULT_CLASSIFIER.classify(content)
}

/// A single pattern rule with a compiled regex.
#[derive(Debug, Clone)]
pub struct ClassifyRule {
    /// Human-readable rule name.
    pub name: String,
    /// Precedence group.
    pub tier: Tier,
    /// Compiled regex for matching.
    pub regex: Regex,
}

/// Which rule decided a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleMatch<'a> {
    pub tier: Tier,
    pub rule: &'a str,
}

/// Tiered, short-circuiting classifier.
#[derive(Debug, Clone)]
pub struct Classifier {
    /// Kept sorted by tier; insertion order within a tier.
    rules: Vec<ClassifyRule>,
}

impl Classifier {
    /// Create a classifier with the built-in rule table.
    pub fn default_rules() -> Self {
        let rules = DEFAULT_RULES
            .iter()
            .map(|(tier, name, pattern)| ClassifyRule {
                name: (*name).to_string(),
                tier: *tier,
                regex: Regex::new(pattern)
                    .unwrap_or_else(|e| panic!("built-in rule {name:?} failed to compile: {e}")),
            })
            .collect();
        Self { rules }
    }

    /// Create a classifier with no rules; everything is News.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Add a custom rule after the existing rules of the same tier.
    pub fn add_rule(&mut self, tier: Tier, name: &str, pattern: &str) -> Result<(), regex::Error> {
        let rule = ClassifyRule {
            name: name.into(),
            tier,
            regex: Regex::new(pattern)?,
        };
        let at = self.rules.partition_point(|r| r.tier <= tier);
        self.rules.insert(at, rule);
        Ok(())
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[ClassifyRule] {
        &self.rules
    }

    /// Find the rule that decides `content`, if any. No side effects.
    pub fn explain(&self, content: &str) -> Option<RuleMatch<'_>> {
        self.rules
            .iter()
            .find(|rule| rule.regex.is_match(content))
            .map(|rule| RuleMatch {
                tier: rule.tier,
                rule: &rule.name,
            })
    }

    /// Decide the category for `content`. Total over all input.
    pub fn classify(&self, content: &str) -> Category {
        match self.explain(content) {
            Some(hit) => {
                let category = hit.tier.category();
                debug!(
                    tier = %hit.tier,
                    rule = hit.rule,
                    category = %category,
                    content_len = content.chars().count(),
                    preview = %preview(content, PREVIEW_CHARS),
                    "Message matched classify rule"
                );
                category
            }
            None => {
                debug!(
                    category = %Category::News,
                    content_len = content.chars().count(),
                    preview = %preview(content, PREVIEW_CHARS),
                    "No script indicators found"
                );
                Category::News
            }
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::default_rules()
    }
}

/// First `max_chars` characters of `content`, with an ellipsis if cut.
pub fn preview(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier_of(content: &str) -> Option<Tier> {
        Classifier::default_rules().explain(content).map(|m| m.tier)
    }

    #[test]
    fn lua_fence_is_script() {
        let content = "```lua\nprint(\"hi\")\n```";
        assert_eq!(classify(content), Category::Scripts);
        let classifier = Classifier::default_rules();
        let hit = classifier.explain(content).unwrap();
        assert_eq!(hit.tier, Tier::CodeEvidence);
        assert_eq!(hit.rule, "lua code fence");
    }

    #[test]
    fn untagged_fence_spanning_lines_is_script() {
        let content = "Here you go:\n```\nsome code\nmore code\n```\nenjoy";
        assert_eq!(tier_of(content), Some(Tier::CodeEvidence));
    }

    #[test]
    fn exploit_apis_are_scripts() {
        for content in [
            "loadstring(game:HttpGet('https://example.com/x'))()",
            "getgenv().AutoFarm = true",
            "setclipboard (key)",
            "HOOKFUNCTION(old, new)",
            "firetouchinterest(part, root, 0)",
            "local speed = 50",
            "Instance.new(\"Part\")",
            "workspace.Baseplate:Destroy()",
        ] {
            assert_eq!(classify(content), Category::Scripts, "{content}");
        }
    }

    #[test]
    fn block_terminator_on_own_line_is_script() {
        let content = "if ready then\n  go()\nend\n";
        assert_eq!(tier_of(content), Some(Tier::CodeEvidence));
    }

    #[test]
    fn one_line_block_terminator_is_script() {
        for content in ["if ok then run() end", "x = 1 end", "for i = 1, 3 do\n  f(i) end\n"] {
            assert_eq!(tier_of(content), Some(Tier::CodeEvidence), "{content}");
        }
    }

    #[test]
    fn word_ending_in_end_is_not_code() {
        assert_eq!(classify("Have a great weekend"), Category::News);
        assert_eq!(classify("The end of the season is near"), Category::News);
    }

    #[test]
    fn raw_content_link_is_script() {
        let content = "Check this out: https://raw.githubusercontent.com/foo/bar.lua";
        assert_eq!(classify(content), Category::Scripts);
        assert_eq!(tier_of(content), Some(Tier::DistributionLink));
    }

    #[test]
    fn script_repository_link_is_script() {
        let content = "New release at https://github.com/someone/best-exploit";
        assert_eq!(tier_of(content), Some(Tier::DistributionLink));
    }

    #[test]
    fn plain_repository_link_is_news() {
        assert_eq!(
            classify("Source code: https://github.com/rust-lang/rust"),
            Category::News
        );
    }

    #[test]
    fn contextual_pairing_across_lines_is_script() {
        let content = "Brand new script\n\nworks on local servers";
        assert_eq!(tier_of(content), Some(Tier::ContextualTerm));
        assert_eq!(classify(content), Category::Scripts);
    }

    #[test]
    fn hack_with_loadstring_mention_is_script() {
        let content = "Best hack of the week, just loadstring it";
        assert_eq!(tier_of(content), Some(Tier::ContextualTerm));
    }

    #[test]
    fn bare_script_word_is_news() {
        assert_eq!(classify("We released a new script hub today!"), Category::News);
        assert_eq!(tier_of("We released a new script hub today!"), None);
    }

    #[test]
    fn announcement_is_news() {
        assert_eq!(classify("Server maintenance completed successfully."), Category::News);
    }

    #[test]
    fn code_evidence_wins_over_contextual_term() {
        let content = "```\nx\n```\nthis script is great";
        let classifier = Classifier::default_rules();
        let hit = classifier.explain(content).unwrap();
        assert_eq!(hit.tier, Tier::CodeEvidence);
        assert_eq!(hit.rule, "fenced block");
    }

    #[test]
    fn code_evidence_wins_over_link() {
        let content = "```lua\nx = 1\n```\nhttps://raw.githubusercontent.com/a/b";
        assert_eq!(tier_of(content), Some(Tier::CodeEvidence));
    }

    #[test]
    fn total_over_odd_input() {
        for content in ["", "   \n\t ", "\u{0}\u{1}\u{fffd}\u{7f}", "```", "🎮🎮🎮"] {
            let category = classify(content);
            assert!(matches!(category, Category::Scripts | Category::News));
        }
        assert_eq!(classify(""), Category::News);
    }

    #[test]
    fn classification_is_deterministic() {
        let samples = ["local x = 1", "hello", "script\nfunction", "```a```"];
        let first: Vec<_> = samples.iter().map(|s| classify(s)).collect();
        let reversed: Vec<_> = samples.iter().rev().map(|s| classify(s)).collect();
        let second: Vec<_> = samples.iter().map(|s| classify(s)).collect();
        assert_eq!(first, second);
        assert_eq!(first, reversed.into_iter().rev().collect::<Vec<_>>());
    }

    #[test]
    fn empty_classifier_says_news() {
        let classifier = Classifier::empty();
        assert_eq!(classifier.classify("loadstring(x)"), Category::News);
    }

    #[test]
    fn custom_rule_lands_in_its_tier() {
        let mut classifier = Classifier::default_rules();
        classifier
            .add_rule(Tier::CodeEvidence, "python def", r"(?m)^def\s+\w+\(")
            .unwrap();
        let tiers: Vec<Tier> = classifier.rules().iter().map(|r| r.tier).collect();
        assert!(tiers.windows(2).all(|w| w[0] <= w[1]));

        let hit = classifier.explain("def main():\n    pass").unwrap();
        assert_eq!(hit.rule, "python def");
        assert_eq!(hit.tier, Tier::CodeEvidence);
    }

    #[test]
    fn invalid_custom_rule_is_rejected() {
        let mut classifier = Classifier::empty();
        assert!(classifier.add_rule(Tier::ContextualTerm, "bad", "(").is_err());
        assert!(classifier.rules().is_empty());
    }

    #[test]
    fn preview_respects_char_boundaries() {
        assert_eq!(preview("héllo", 2), "hé...");
        assert_eq!(preview("short", 200), "short");
        assert_eq!(preview("", 10), "");
    }
}
