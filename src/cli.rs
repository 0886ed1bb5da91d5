//! Command-line interface definitions.
//!
//! All paths are resolved against `--root`, so the tool can be pointed at a
//! checkout of the publishing repository from anywhere.

use crate::outputs::readme::PublishTarget;
use crate::pipeline::{Paths, PipelineOptions};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # Fetch, merge and regenerate the README with the built-in config
/// animeko_source
///
/// # Custom config, only rebuild the README tables
/// animeko_source --config sources.yaml readme
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Optional path to a YAML config file (built-in sources are used otherwise)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Repository root that the paths below are relative to
    #[arg(short, long, default_value = ".", global = true)]
    pub root: PathBuf,

    /// Directory holding the raw feed cache, one subdirectory per category
    #[arg(long, default_value = "source", global = true)]
    pub source_dir: PathBuf,

    /// Directory for merged outputs; also used in the published raw URLs
    #[arg(long, default_value = "dist", global = true)]
    pub dist_dir: String,

    /// README file whose generated region is rewritten
    #[arg(long, default_value = "README.md", global = true)]
    pub readme: PathBuf,

    /// Log file, truncated at the start of every run
    #[arg(long, default_value = "log", global = true)]
    pub log_file: PathBuf,

    /// Repository (`owner/name`) used to build output links
    #[arg(long, env = "GITHUB_REPOSITORY", default_value = "MajoSissi/animeko-source", global = true)]
    pub repo: String,

    /// Branch used to build output links
    #[arg(long, default_value = "main", global = true)]
    pub branch: String,

    /// Per-request download timeout in seconds
    #[arg(long, default_value_t = 60, global = true)]
    pub timeout_secs: u64,

    /// Keep cached feed files that no configured feed produced
    #[arg(long, global = true)]
    pub keep_stale_cache: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Merge all sources, then regenerate the README (default)
    Run,
    /// Only fetch and merge sources
    Sources,
    /// Only regenerate the README tables
    Readme,
    /// Concatenate hand-maintained `{ mediaSources: [...] }` files into one feed
    Combine {
        /// Directory of files to combine, relative to `--root`
        #[arg(default_value = "custom")]
        dir: PathBuf,

        /// Output file, relative to `--root`
        #[arg(short, long, default_value = "source/ani.json")]
        output: PathBuf,
    },
}

impl Command {
    pub fn merges_sources(&self) -> bool {
        matches!(self, Command::Run | Command::Sources)
    }

    pub fn updates_readme(&self) -> bool {
        matches!(self, Command::Run | Command::Readme)
    }
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }

    pub fn paths(&self) -> Paths {
        Paths {
            source_dir: self.root.join(&self.source_dir),
            dist_dir: self.root.join(&self.dist_dir),
        }
    }

    pub fn readme_path(&self) -> PathBuf {
        self.root.join(&self.readme)
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(&self.log_file)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            prune_cache: !self.keep_stale_cache,
        }
    }

    pub fn publish_target(&self) -> PublishTarget {
        PublishTarget {
            repo: self.repo.clone(),
            branch: self.branch.clone(),
            dist_path: self.dist_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["animeko_source"]);

        assert_eq!(cli.command(), Command::Run);
        assert!(cli.config.is_none());
        let paths = cli.paths();
        assert_eq!(paths.source_dir, Path::new("./source"));
        assert_eq!(paths.dist_dir, Path::new("./dist"));
        assert_eq!(cli.log_path(), Path::new("./log"));
        assert_eq!(cli.timeout(), Duration::from_secs(60));
        assert!(cli.pipeline_options().prune_cache);
        assert_eq!(cli.publish_target().branch, "main");
    }

    #[test]
    fn test_cli_subcommand_and_flags() {
        let cli = Cli::parse_from([
            "animeko_source",
            "readme",
            "--root",
            "/srv/repo",
            "--config",
            "sources.yaml",
            "--repo",
            "me/mine",
            "--keep-stale-cache",
        ]);

        assert_eq!(cli.command(), Command::Readme);
        assert!(!cli.command().merges_sources());
        assert!(cli.command().updates_readme());
        assert_eq!(cli.config.as_deref(), Some(Path::new("sources.yaml")));
        assert_eq!(cli.readme_path(), Path::new("/srv/repo/README.md"));
        assert_eq!(cli.publish_target().repo, "me/mine");
        assert!(!cli.pipeline_options().prune_cache);
    }

    #[test]
    fn test_combine_subcommand() {
        let cli = Cli::parse_from(["animeko_source", "combine", "-o", "out/ani.json"]);
        let command = cli.command();
        assert!(!command.merges_sources());
        assert!(!command.updates_readme());
        assert_eq!(
            command,
            Command::Combine {
                dir: PathBuf::from("custom"),
                output: PathBuf::from("out/ani.json"),
            }
        );
    }

    #[test]
    fn test_sources_subcommand_skips_readme() {
        let cli = Cli::parse_from(["animeko_source", "sources", "-r", "/tmp/x"]);
        assert!(cli.command().merges_sources());
        assert!(!cli.command().updates_readme());
        assert_eq!(cli.paths().dist_dir, Path::new("/tmp/x/dist"));
    }
}
