use crate::analysis::Analyzer;
use crate::config::Config;
use crate::engine::Engine;
use crate::solver::ProcessSolver;
use anyhow::{Context, Result, bail};
use glob::glob;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Simulation directory: `config.toml` plus one `run-NNNN` directory per run.
pub struct Manager {
    sim_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(sim_dir: P) -> Result<Self> {
        let sim_dir = sim_dir.as_ref().to_path_buf();

        let cfg =
            Config::from_file(sim_dir.join("config.toml")).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        Ok(Self { sim_dir, cfg })
    }

    pub fn create_run(&self) -> Result<()> {
        let run_idx = self.count_run_dirs().context("failed to count run dirs")?;

        let run_dir = self.run_dir(run_idx);
        fs::create_dir_all(&run_dir).with_context(|| format!("failed to create {run_dir:?}"))?;
        log::info!("created {run_dir:?}");

        let mut engine = Engine::generate_initial_condition(self.cfg.clone(), &self.sim_dir)
            .context("failed to generate initial condition")?;

        if self.cfg.init.n_training_examples > 0 {
            engine
                .save_training_examples(&run_dir)
                .context("failed to save training examples")?;
        }

        self.run_simulation(run_idx, 0, engine)
    }

    pub fn resume_run(&self, run_idx: usize) -> Result<()> {
        let file_idx = self
            .count_trajectory_files(run_idx)
            .context("failed to count trajectory files")?;

        let checkpoint_file = self.checkpoint_file(run_idx);
        let engine = Engine::load_checkpoint(&checkpoint_file)
            .with_context(|| format!("failed to load {checkpoint_file:?}"))?;
        if engine.cfg() != &self.cfg {
            bail!("checkpoint config differs from the current config");
        }
        log::info!("loaded {checkpoint_file:?}");

        self.run_simulation(run_idx, file_idx, engine)
    }

    pub fn analyze_sim(&self) -> Result<()> {
        let n_runs = self.count_run_dirs().context("failed to count run dirs")?;
        for run_idx in 0..n_runs {
            let mut analyzer = Analyzer::new(&self.cfg);

            let n_files = self
                .count_trajectory_files(run_idx)
                .context("failed to count trajectory files")?;
            for file_idx in 0..n_files {
                analyzer
                    .add_file(self.trajectory_file(run_idx, file_idx))
                    .context("failed to add file")?;
            }

            let results_file = self.results_file(run_idx);
            analyzer
                .save_results(&results_file)
                .context("failed to save results")?;
            log::info!("saved {results_file:?}");
        }

        Ok(())
    }

    pub fn clean_sim(&self) -> Result<()> {
        for run_dir in self.run_dirs().context("failed to list run dirs")? {
            fs::remove_dir_all(&run_dir)
                .with_context(|| format!("failed to remove {run_dir:?}"))?;
            log::info!("removed {run_dir:?}");
        }

        Ok(())
    }

    fn run_simulation(&self, run_idx: usize, file_idx: usize, mut engine: Engine) -> Result<()> {
        if let Some(solver_cfg) = &self.cfg.solver {
            engine.set_solver(Box::new(ProcessSolver::new(
                solver_cfg.clone(),
                &self.sim_dir,
            )));
        }

        engine
            .perform_simulation(self.trajectory_file(run_idx, file_idx))
            .context("failed to perform simulation")?;

        engine
            .save_checkpoint(self.checkpoint_file(run_idx))
            .context("failed to save checkpoint")?;

        Ok(())
    }

    fn run_dirs(&self) -> Result<Vec<PathBuf>> {
        let pattern = self.sim_dir.join("run-*");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let run_dirs = glob(pattern)
            .context("failed to glob run dirs")?
            .filter_map(Result::ok)
            .filter(|path| path.is_dir())
            .collect();
        Ok(run_dirs)
    }

    fn count_run_dirs(&self) -> Result<usize> {
        Ok(self.run_dirs()?.len())
    }

    fn run_dir(&self, run_idx: usize) -> PathBuf {
        self.sim_dir.join(format!("run-{run_idx:04}"))
    }

    fn count_trajectory_files(&self, run_idx: usize) -> Result<usize> {
        let pattern = self.run_dir(run_idx).join("trajectory-*.csv");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let count = glob(pattern)
            .context("failed to glob trajectory files")?
            .filter_map(Result::ok)
            .count();
        Ok(count)
    }

    fn checkpoint_file(&self, run_idx: usize) -> PathBuf {
        self.run_dir(run_idx).join("checkpoint.msgpack")
    }

    fn trajectory_file(&self, run_idx: usize, file_idx: usize) -> PathBuf {
        self.run_dir(run_idx)
            .join(format!("trajectory-{file_idx:04}.csv"))
    }

    fn results_file(&self, run_idx: usize) -> PathBuf {
        self.run_dir(run_idx).join("results.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
[model]
algorithm = "default"
update = "sequential"

[network]
n_agents = 5
edge_file = "edges.txt"

[init]
prob_seed = 0.4

[output]
ticks_per_file = 8
"#;

    fn sim_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.toml"), CONFIG).unwrap();
        fs::write(dir.path().join("edges.txt"), "0 1\n1 2\n2 3\n3 4\n4 0\n").unwrap();
        dir
    }

    #[test]
    fn runs_are_created_resumed_and_cleaned() {
        let dir = sim_dir();
        let mgr = Manager::new(dir.path()).unwrap();

        mgr.create_run().unwrap();
        mgr.create_run().unwrap();
        mgr.resume_run(0).unwrap();
        assert_eq!(mgr.count_run_dirs().unwrap(), 2);
        assert_eq!(mgr.count_trajectory_files(0).unwrap(), 2);
        assert_eq!(mgr.count_trajectory_files(1).unwrap(), 1);

        let text = fs::read_to_string(mgr.trajectory_file(0, 1)).unwrap();
        assert_eq!(text.lines().count(), 40);
        assert!(text.starts_with("8,0,"));

        mgr.analyze_sim().unwrap();
        assert!(mgr.results_file(0).is_file());
        assert!(mgr.results_file(1).is_file());

        mgr.clean_sim().unwrap();
        assert_eq!(mgr.count_run_dirs().unwrap(), 0);
        assert!(dir.path().join("config.toml").is_file());
    }

    #[test]
    fn resume_rejects_changed_config() {
        let dir = sim_dir();
        Manager::new(dir.path()).unwrap().create_run().unwrap();

        let changed = CONFIG.replace("prob_seed = 0.4", "prob_seed = 0.5");
        fs::write(dir.path().join("config.toml"), changed).unwrap();
        let mgr = Manager::new(dir.path()).unwrap();
        assert!(mgr.resume_run(0).is_err());
        assert!(mgr.resume_run(3).is_err());
    }
}
