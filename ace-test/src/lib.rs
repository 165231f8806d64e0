// Integration test utilities and fixture management for ACE.

use std::path::Path;

use ace_core::apply::{ApplyOptions, RunSummary, run_apply};
use ace_core::config::AceConfig;
use ace_core::progress::NoopReporter;
use ace_core::rules::RuleRegistry;

/// A test fixture with a temporary Python project.
#[derive(Debug)]
pub struct TestProject {
    pub dir: tempfile::TempDir,
}

impl TestProject {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.path().join(rel)).expect("fixture file readable")
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    /// A small project exhibiting every built-in rule: trailing
    /// whitespace, bare excepts, and mutable default arguments.
    pub fn messy_python() -> Self {
        let dir = tempfile::tempdir().expect("create tempdir");
        let project = Self { dir };

        project.write(
            "app/api.py",
            concat!(
                "import json   \n",
                "\n",
                "def load(path):\n",
                "    try:\n",
                "        with open(path) as f:\n",
                "            return json.load(f)\n",
                "    except:\n",
                "        return None\n",
            ),
        );
        project.write(
            "app/util.py",
            concat!(
                "def merge(target, extra={}):\n",
                "    target.update(extra)   \n",
                "    return target\n",
            ),
        );
        project.write(
            "app/legacy.py",
            concat!(
                "def old():\n",
                "    try:\n",
                "        old_impl()\n",
                "    except:  # ace: disable-line\n",
                "        pass\n",
            ),
        );
        // Non-Python content never enters the pipeline.
        project.write("README.md", "except:\ntrailing   \n");
        project
    }

    /// Write `.ace/config.toml` with the given thresholds; the built-in
    /// rules' severities sit below the conservative defaults.
    pub fn init(&self, auto_threshold: f64, suggest_threshold: f64) {
        let mut config = AceConfig::default();
        config.scoring.auto_threshold = auto_threshold;
        config.scoring.suggest_threshold = suggest_threshold;
        let text = toml_string(&config);
        self.write(".ace/config.toml", &text);
    }

    pub fn config(&self) -> AceConfig {
        AceConfig::load(&ace_core::apply::config_path(self.path())).expect("config loads")
    }
}

fn toml_string(config: &AceConfig) -> String {
    toml::to_string_pretty(config).expect("config serializes")
}

/// Run the full pipeline against a fixture with default options.
pub fn run_full(project: &TestProject) -> ace_core::error::Result<RunSummary> {
    run_apply(
        project.path(),
        &project.config(),
        &RuleRegistry::builtin(),
        &ApplyOptions::default(),
        &NoopReporter,
    )
}

/// Run the full pipeline with custom options.
pub fn run_with_options(
    project: &TestProject,
    options: &ApplyOptions,
) -> ace_core::error::Result<RunSummary> {
    run_apply(
        project.path(),
        &project.config(),
        &RuleRegistry::builtin(),
        options,
        &NoopReporter,
    )
}
