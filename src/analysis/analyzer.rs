//! Risk feature extraction for change sets
//!
//! Every feature is a pure function of the [`ChangeSet`]: path patterns and
//! keyword lists are matched against the parsed diff, title and body.

use glob::Pattern;
use regex::Regex;
use std::collections::BTreeSet;
use tracing::debug;

use crate::analysis::changeset::{AuthorAssociation, ChangeSet, DiffFile};
use crate::analysis::factors::*;
use crate::error::SecurityGateError;

const SENSITIVE_PATH_HIT: f64 = 2.0;
const DANGEROUS_CONSTRUCT_HIT: f64 = 3.0;
const NEW_DEPENDENCY_WEIGHT: f64 = 2.0;

const SENSITIVE_PATHS: &[&str] = &[
    "**/auth/**",
    "**/authentication/**",
    "**/security/**",
    "**/secrets/**",
    "**/crypto/**",
    "**/.github/workflows/**",
    "**/.gitlab-ci.yml",
    "**/Jenkinsfile",
    "**/.env",
    "**/.env.*",
    "**/*.pem",
    "**/*.key",
];

const SECURITY_KEYWORDS: &[&str] = &[
    "password",
    "secret",
    "api_key",
    "apikey",
    "private_key",
    "access_token",
    "auth_token",
    "credential",
];

const DANGEROUS_CONSTRUCTS: &[(&str, &str)] = &[
    ("dynamic code evaluation", r"\beval\s*\("),
    ("dynamic function constructor", r"\bnew\s+Function\s*\("),
    ("string timer evaluation", r#"\bset(Timeout|Interval)\s*\(\s*["'`]"#),
    ("unsafe DOM injection", r"\.(inner|outer)HTML\s*="),
    ("unsafe DOM injection", r"dangerouslySetInnerHTML"),
    ("unsafe DOM injection", r"\bdocument\.write\s*\("),
];

const MANIFEST_FILES: &[&str] = &[
    "package.json",
    "Cargo.toml",
    "requirements.txt",
    "pyproject.toml",
    "Pipfile",
    "go.mod",
    "Gemfile",
    "composer.json",
];

const MANIFEST_METADATA_KEYS: &[&str] = &[
    "name",
    "version",
    "description",
    "main",
    "license",
    "private",
    "type",
    "edition",
    "authors",
    "repository",
    "homepage",
    "readme",
    "path",
    "resolver",
    "rust-version",
    "node",
    "npm",
    "module",
    "go",
];

const CONFIG_PATTERNS: &[(&str, f64)] = &[
    ("**/.env", 3.0),
    ("**/.env.*", 3.0),
    ("**/*secret*", 3.0),
    ("**/*.yml", 1.0),
    ("**/*.yaml", 1.0),
    ("**/*.toml", 1.0),
    ("**/*.ini", 1.0),
    ("**/*.cfg", 1.0),
    ("**/*.conf", 1.0),
    ("**/*.properties", 1.0),
    ("**/config/**", 1.0),
    ("**/Dockerfile", 1.0),
    ("**/docker-compose*", 1.0),
];

const FIX_KEYWORDS: &[&str] = &[
    "cve-",
    "ghsa-",
    "security fix",
    "security patch",
    "vulnerability",
    "advisory",
    "xss",
    "sql injection",
    "csrf",
];

const TEST_PATTERNS: &[&str] = &[
    "**/tests/**",
    "**/test/**",
    "**/__tests__/**",
    "**/*_test.*",
    "**/*.test.*",
    "**/*.spec.*",
    "**/test_*",
];

const DOC_PATTERNS: &[&str] = &[
    "**/*.md",
    "**/*.txt",
    "**/*.rst",
    "**/docs/**",
    "**/LICENSE*",
];

const CONTROL_FLOW: &str =
    r"\b(if|else|elif|for|while|loop|match|switch|case|catch|except)\b|&&|\|\|";

/// Compiled rule set for feature extraction
#[derive(Debug, Clone)]
pub struct ChangeSetAnalyzer {
    sensitive_paths: Vec<Pattern>,
    dangerous_constructs: Vec<(String, Regex)>,
    config_patterns: Vec<(Pattern, f64)>,
    test_patterns: Vec<Pattern>,
    doc_patterns: Vec<Pattern>,
    control_flow: Regex,
    npm_dependency: Regex,
    toml_dependency: Regex,
    requirement_dependency: Regex,
    go_dependency: Regex,
    security_team: Vec<String>,
}

impl ChangeSetAnalyzer {
    pub fn new(security_team: Vec<String>) -> Result<Self, SecurityGateError> {
        let dangerous_constructs = DANGEROUS_CONSTRUCTS
            .iter()
            .map(|(name, expr)| Ok((name.to_string(), compile_regex(expr)?)))
            .collect::<Result<Vec<_>, SecurityGateError>>()?;

        let config_patterns = CONFIG_PATTERNS
            .iter()
            .map(|(pattern, weight)| Ok((compile_glob(pattern)?, *weight)))
            .collect::<Result<Vec<_>, SecurityGateError>>()?;

        Ok(Self {
            sensitive_paths: compile_globs(SENSITIVE_PATHS)?,
            dangerous_constructs,
            config_patterns,
            test_patterns: compile_globs(TEST_PATTERNS)?,
            doc_patterns: compile_globs(DOC_PATTERNS)?,
            control_flow: compile_regex(CONTROL_FLOW)?,
            npm_dependency: compile_regex(r#"^\s*"(@?[\w./-]+)"\s*:\s*"[\^~<>=*\dvlg]"#)?,
            toml_dependency: compile_regex(
                r#"^\s*([A-Za-z0-9_-]+)\s*=\s*("[\^~<>=*\d]|\{[^}]*\b(version|git|path)\b)"#,
            )?,
            requirement_dependency: compile_regex(r"^\s*([A-Za-z0-9_.\-\[\]]+)\s*(==|>=|<=|~=|!=|>|<)")?,
            go_dependency: compile_regex(r"^\s*(?:require\s+)?([\w.\-]+\.[\w.\-/]+)\s+v\d")?,
            security_team: security_team.into_iter().map(|m| m.to_lowercase()).collect(),
        })
    }

    /// Extract every risk factor from the change set
    pub fn analyze(&self, changeset: &ChangeSet) -> RiskFactors {
        let files = changeset.files();
        debug!(
            "Analyzing {} with {} changed files",
            changeset.id(),
            files.len()
        );

        RiskFactors {
            security_changes: self.security_changes(&files),
            dependency_changes: self.dependency_changes(&files),
            config_changes: self.config_changes(&files),
            vuln_fixes: self.vuln_fixes(changeset, &files),
            test_coverage: self.test_coverage(&files),
            code_complexity: self.code_complexity(&files),
            author_risk: self.author_risk(changeset),
            review_status: self.review_status(changeset),
        }
    }

    pub fn security_changes(&self, files: &[DiffFile]) -> SecurityChanges {
        let mut result = SecurityChanges::default();
        let mut score = 0.0;

        for file in files {
            let path_hit = self.sensitive_paths.iter().any(|p| p.matches(&file.path));
            let keyword_hit = file.added_lines.iter().find_map(|line| {
                let lower = line.to_lowercase();
                SECURITY_KEYWORDS.iter().find(|k| lower.contains(*k))
            });

            if path_hit || keyword_hit.is_some() {
                score += SENSITIVE_PATH_HIT;
                result.requires_approval = true;
                let reason = match keyword_hit {
                    Some(keyword) if !path_hit => format!("keyword '{}'", keyword),
                    _ => "sensitive path".to_string(),
                };
                result.findings.push(format!("{}: {}", file.path, reason));
            }

            for line in &file.added_lines {
                for (name, construct) in &self.dangerous_constructs {
                    if construct.is_match(line) {
                        score += DANGEROUS_CONSTRUCT_HIT;
                        result.has_critical_vulns = true;
                        result.requires_approval = true;
                        result.findings.push(format!("{}: {}", file.path, name));
                    }
                }
            }
        }

        result.score = score.min(MAX_FACTOR_SCORE);
        result
    }

    pub fn dependency_changes(&self, files: &[DiffFile]) -> DependencyChanges {
        let mut result = DependencyChanges::default();
        let mut new_dependencies = BTreeSet::new();

        for file in files {
            let file_name = file.path.rsplit('/').next().unwrap_or(&file.path);
            if !MANIFEST_FILES.contains(&file_name) {
                continue;
            }
            result.manifests.push(file.path.clone());

            let syntax = match file_name {
                "package.json" | "composer.json" => &self.npm_dependency,
                "Cargo.toml" | "pyproject.toml" | "Pipfile" => &self.toml_dependency,
                "requirements.txt" => &self.requirement_dependency,
                "go.mod" => &self.go_dependency,
                _ => continue,
            };

            for line in &file.added_lines {
                if let Some(captures) = syntax.captures(line) {
                    let name = &captures[1];
                    if !MANIFEST_METADATA_KEYS.contains(&name) {
                        new_dependencies.insert(name.to_string());
                    }
                }
            }
        }

        result.new_dependencies = new_dependencies.into_iter().collect();
        result.risk_level =
            (result.new_dependencies.len() as f64 * NEW_DEPENDENCY_WEIGHT).min(MAX_FACTOR_SCORE);
        result
    }

    pub fn config_changes(&self, files: &[DiffFile]) -> ConfigChanges {
        let mut result = ConfigChanges::default();
        let mut sensitivity = 0.0;

        for file in files {
            let weight = self
                .config_patterns
                .iter()
                .filter(|(pattern, _)| pattern.matches(&file.path))
                .map(|(_, weight)| *weight)
                .fold(0.0, f64::max);

            if weight > 0.0 {
                sensitivity += weight;
                result.files.push(file.path.clone());
            }
        }

        result.sensitivity = sensitivity.min(MAX_FACTOR_SCORE);
        result
    }

    pub fn vuln_fixes(&self, changeset: &ChangeSet, files: &[DiffFile]) -> VulnFixes {
        let mut result = VulnFixes::default();

        let mut corpus = vec![changeset.title.to_lowercase(), changeset.body.to_lowercase()];
        corpus.extend(
            files
                .iter()
                .flat_map(|f| f.added_lines.iter())
                .map(|line| line.to_lowercase()),
        );

        for text in &corpus {
            for keyword in FIX_KEYWORDS {
                let hits = text.matches(keyword).count() as u32;
                if hits > 0 {
                    result.count += hits;
                    if !result.references.iter().any(|r| r.as_str() == *keyword) {
                        result.references.push(keyword.to_string());
                    }
                }
            }
        }

        result.is_security_fix = result.count > 0;
        result
    }

    pub fn test_coverage(&self, files: &[DiffFile]) -> TestCoverage {
        let mut result = TestCoverage::default();

        for file in files {
            let lines = file
                .added_lines
                .iter()
                .filter(|l| !l.trim().is_empty())
                .count();
            if self.is_test_file(&file.path) {
                result.test_lines += lines;
            } else if !self.is_doc_file(&file.path) {
                result.code_lines += lines;
            }
        }

        result.ratio = if result.code_lines == 0 {
            if result.test_lines > 0 {
                MAX_TEST_COVERAGE
            } else {
                0.0
            }
        } else {
            (result.test_lines as f64 / result.code_lines as f64 * 100.0).min(MAX_TEST_COVERAGE)
        };
        result
    }

    pub fn code_complexity(&self, files: &[DiffFile]) -> CodeComplexity {
        let mut result = CodeComplexity::default();
        let mut lines = 0usize;

        for file in files.iter().filter(|f| !self.is_doc_file(&f.path)) {
            for line in file.added_lines.iter().filter(|l| !l.trim().is_empty()) {
                lines += 1;
                result.branch_points += self.control_flow.find_iter(line).count();
            }
        }

        if lines > 0 {
            let density = result.branch_points as f64 / lines as f64;
            result.score = (density * MAX_FACTOR_SCORE).min(MAX_FACTOR_SCORE);
        }
        result
    }

    pub fn author_risk(&self, changeset: &ChangeSet) -> AuthorRisk {
        let author = &changeset.author;
        let score = if author.is_bot {
            1.0
        } else {
            match author.association {
                AuthorAssociation::Owner
                | AuthorAssociation::Member
                | AuthorAssociation::Collaborator => 0.0,
                AuthorAssociation::Contributor => 3.0,
                AuthorAssociation::Mannequin | AuthorAssociation::None => 5.0,
                AuthorAssociation::FirstTimeContributor | AuthorAssociation::FirstTimer => 6.0,
            }
        };

        AuthorRisk {
            login: author.login.clone(),
            score,
        }
    }

    pub fn review_status(&self, changeset: &ChangeSet) -> ReviewStatus {
        let approvers = changeset.approvers();
        let security_team_approval = approvers
            .iter()
            .any(|a| self.security_team.contains(&a.to_lowercase()));
        let changes_requested = changeset.changes_requested();

        let mut quality = approvers.len() as f64 * 3.0;
        if security_team_approval {
            quality += 4.0;
        }
        if changes_requested {
            quality -= 3.0;
        }

        ReviewStatus {
            approvals: approvers.len() as u32,
            security_team_approval,
            changes_requested,
            quality_score: quality.clamp(0.0, MAX_FACTOR_SCORE),
        }
    }

    pub fn is_security_team_member(&self, login: &str) -> bool {
        self.security_team.contains(&login.to_lowercase())
    }

    fn is_test_file(&self, path: &str) -> bool {
        self.test_patterns.iter().any(|p| p.matches(path))
    }

    fn is_doc_file(&self, path: &str) -> bool {
        self.doc_patterns.iter().any(|p| p.matches(path))
    }
}

fn compile_glob(pattern: &str) -> Result<Pattern, SecurityGateError> {
    Pattern::new(pattern).map_err(|e| {
        SecurityGateError::ConfigError(format!("Invalid path pattern '{}': {}", pattern, e))
    })
}

fn compile_globs(patterns: &[&str]) -> Result<Vec<Pattern>, SecurityGateError> {
    patterns.iter().map(|p| compile_glob(p)).collect()
}

fn compile_regex(expr: &str) -> Result<Regex, SecurityGateError> {
    Regex::new(expr)
        .map_err(|e| SecurityGateError::ConfigError(format!("Invalid pattern '{}': {}", expr, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::changeset::{Author, Review, ReviewState};

    fn analyzer() -> ChangeSetAnalyzer {
        ChangeSetAnalyzer::new(vec!["SecLead".to_string()]).unwrap()
    }

    fn file(path: &str, added: &[&str]) -> DiffFile {
        DiffFile {
            path: path.to_string(),
            added_lines: added.iter().map(|l| l.to_string()).collect(),
            ..DiffFile::default()
        }
    }

    fn changeset(title: &str, body: &str) -> ChangeSet {
        ChangeSet {
            repo: "acme/app".to_string(),
            number: 1,
            title: title.to_string(),
            body: body.to_string(),
            author: Author {
                login: "dev".to_string(),
                association: AuthorAssociation::Contributor,
                is_bot: false,
            },
            head_sha: "head".to_string(),
            base_sha: "base".to_string(),
            diff: String::new(),
            reviews: vec![],
            checks: vec![],
        }
    }

    #[test]
    fn test_readme_only_is_not_security_relevant() {
        let result = analyzer().security_changes(&[file("README.md", &["Usage notes"])]);
        assert_eq!(result.score, 0.0);
        assert!(!result.requires_approval);
        assert!(!result.has_critical_vulns);
    }

    #[test]
    fn test_sensitive_path_adds_two() {
        let result = analyzer().security_changes(&[
            file("src/auth/session.rs", &["fn refresh() {}"]),
            file(".github/workflows/ci.yml", &["on: push"]),
        ]);
        assert_eq!(result.score, 4.0);
        assert!(result.requires_approval);
        assert!(!result.has_critical_vulns);
    }

    #[test]
    fn test_dangerous_construct_adds_three() {
        let result = analyzer().security_changes(&[file(
            "web/app.js",
            &["const out = eval(input);", "node.innerHTML = html;"],
        )]);
        assert_eq!(result.score, 6.0);
        assert!(result.has_critical_vulns);
        assert!(result.requires_approval);
    }

    #[test]
    fn test_security_score_is_capped() {
        let lines: Vec<&str> = std::iter::repeat("eval(x)").take(10).collect();
        let result = analyzer().security_changes(&[file("src/secrets/a.js", &lines)]);
        assert_eq!(result.score, MAX_FACTOR_SCORE);
    }

    #[test]
    fn test_new_dependencies_detected() {
        let result = analyzer().dependency_changes(&[
            file(
                "package.json",
                &[r#"  "version": "2.0.0","#, r#"  "left-pad": "^1.3.0","#, r#"  "@types/node": "~20.1.0""#],
            ),
            file(
                "crates/core/Cargo.toml",
                &[r#"serde = { version = "1", features = ["derive"] }"#, r#"edition = "2021""#],
            ),
            file("requirements.txt", &["requests==2.31.0"]),
        ]);

        assert_eq!(result.manifests.len(), 3);
        assert_eq!(
            result.new_dependencies,
            vec!["@types/node", "left-pad", "requests", "serde"]
        );
        assert_eq!(result.risk_level, 8.0);
    }

    #[test]
    fn test_config_sensitivity_weights() {
        let result = analyzer().config_changes(&[
            file(".env", &["A=1"]),
            file("deploy/app.yaml", &["replicas: 2"]),
            file("src/main.rs", &["fn main() {}"]),
        ]);
        assert_eq!(result.sensitivity, 4.0);
        assert_eq!(result.files, vec![".env", "deploy/app.yaml"]);
    }

    #[test]
    fn test_vuln_fix_keywords() {
        let cs = changeset("Security fix for CVE-2024-1234", "Addresses advisory GHSA-xxxx");
        let result = analyzer().vuln_fixes(&cs, &[]);
        assert!(result.is_security_fix);
        assert_eq!(result.count, 4);
    }

    #[test]
    fn test_test_coverage_ratio() {
        let result = analyzer().test_coverage(&[
            file("src/lib.rs", &["a", "b", "c", "d"]),
            file("tests/lib_test.rs", &["t1", "t2"]),
            file("README.md", &["docs"]),
        ]);
        assert_eq!(result.code_lines, 4);
        assert_eq!(result.test_lines, 2);
        assert_eq!(result.ratio, 50.0);
    }

    #[test]
    fn test_complexity_density() {
        let result = analyzer().code_complexity(&[file(
            "src/lib.rs",
            &["if a && b {", "    run();", "} else {", "}"],
        )]);
        assert_eq!(result.branch_points, 3);
        assert_eq!(result.score, 7.5);
    }

    #[test]
    fn test_review_quality_with_security_team() {
        let mut cs = changeset("t", "b");
        cs.reviews = vec![Review {
            reviewer: "seclead".to_string(),
            state: ReviewState::Approved,
            submitted_at: None,
        }];
        let status = analyzer().review_status(&cs);
        assert_eq!(status.approvals, 1);
        assert!(status.security_team_approval);
        assert_eq!(status.quality_score, 7.0);
    }

    #[test]
    fn test_author_risk_by_association() {
        let mut cs = changeset("t", "b");
        assert_eq!(analyzer().author_risk(&cs).score, 3.0);
        cs.author.association = AuthorAssociation::Owner;
        assert_eq!(analyzer().author_risk(&cs).score, 0.0);
        cs.author.association = AuthorAssociation::FirstTimeContributor;
        assert_eq!(analyzer().author_risk(&cs).score, 6.0);
    }
}
