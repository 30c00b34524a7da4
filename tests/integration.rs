use std::{env, fs, path::PathBuf, process::Command};

fn run_bin(args: &[&str]) {
    let bin = PathBuf::from(env!("CARGO_BIN_EXE_mann"));

    let output = Command::new(bin)
        .args(args)
        .output()
        .expect("failed to execute command");

    let stdout_str =
        std::str::from_utf8(&output.stdout).expect("failed to convert stdout to string");
    let stderr_str =
        std::str::from_utf8(&output.stderr).expect("failed to convert stderr to string");

    assert!(
        output.status.success(),
        "failed to run binary with {args:?}\nstdout:\n{stdout_str}\nstderr:\n{stderr_str}\n"
    );
}

fn prepare_dir(name: &str, config_contents: &str) -> PathBuf {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(name);

    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir(&test_dir).expect("failed to create test directory");

    fs::write(test_dir.join("config.toml"), config_contents).expect("failed to write config file");

    test_dir
}

#[test]
fn basic_workflow() {
    let config_contents = String::new()
        + "seed = 42\n"
        + "\n"
        + "[model]\n"
        + "algorithm = \"threshold_watts\"\n"
        + "update = \"simultaneous\"\n"
        + "threshold = 0.3\n"
        + "selection = { fraction = 0.5 }\n"
        + "\n"
        + "[network]\n"
        + "n_agents = 64\n"
        + "prob_edge = 0.05\n"
        + "\n"
        + "[init]\n"
        + "prob_seed = 0.1\n"
        + "\n"
        + "[output]\n"
        + "ticks_per_file = 256\n";
    let test_dir = prepare_dir("basic_workflow", &config_contents);

    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    run_bin(&["--sim-dir", test_dir_str, "create"]);
    run_bin(&["--sim-dir", test_dir_str, "create"]);

    run_bin(&["--sim-dir", test_dir_str, "resume", "--run-idx", "0"]);
    run_bin(&["--sim-dir", test_dir_str, "resume", "--run-idx", "0"]);

    run_bin(&["--sim-dir", test_dir_str, "resume", "--run-idx", "1"]);

    for run_idx in 0..2 {
        let run_dir = test_dir.join(format!("run-{run_idx:04}"));
        assert!(run_dir.join("checkpoint.msgpack").is_file());
        assert!(run_dir.join("trajectory-0001.csv").is_file());
    }

    run_bin(&["--sim-dir", test_dir_str, "analyze"]);

    let results = fs::read_to_string(test_dir.join("run-0000").join("results.json"))
        .expect("failed to read results");
    let results: serde_json::Value =
        serde_json::from_str(&results).expect("failed to parse results");
    let adoption = results[0]["adoption"]["mean"]
        .as_f64()
        .expect("adoption mean is not a number");
    assert!((0.0..=1.0).contains(&adoption));

    run_bin(&["--sim-dir", test_dir_str, "clean"]);
    assert!(!test_dir.join("run-0000").exists());

    fs::remove_dir_all(&test_dir).ok();
}

#[cfg(unix)]
#[test]
fn external_solver_workflow() {
    // The solver echoes the first sampled influence back as the new state.
    let script = "awk '/^I:/ { n++ } /^I:/ && n == 2 { for (i = 2; i < NF; i++) print $i }' \
                  Infl.ex > AgentState.out";
    let config_contents = format!(
        r#"
[model]
algorithm = "external_random_1"
update = "sequential"

[network]
n_agents = 4
edges = [[0, 1], [1, 2], [2, 3], [3, 0]]

[init]
prototypes = [[1, 1, 0, 0], [0, 0, 1, 1]]
prob_mut = 0.25
n_training_examples = 3

[output]
ticks_per_file = 4

[solver]
program = "sh"
args = ["-c", "{script}"]
ex_file = "Infl.ex"
out_file = "AgentState.out"
window = [1, 2, 3, 4]
"#
    );
    let test_dir = prepare_dir("external_solver_workflow", &config_contents);

    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    run_bin(&["--sim-dir", test_dir_str, "create"]);
    run_bin(&["--sim-dir", test_dir_str, "resume", "--run-idx", "0"]);

    let run_dir = test_dir.join("run-0000");
    assert!(run_dir.join("training-000003.ex").is_file());

    let trajectory = fs::read_to_string(run_dir.join("trajectory-0001.csv"))
        .expect("failed to read trajectory");
    assert_eq!(trajectory.lines().count(), 16);
    for line in trajectory.lines() {
        let n_fields = line.split(',').count();
        assert_eq!(n_fields, 5 + 4 * 4, "unexpected record {line}");
    }

    run_bin(&["--sim-dir", test_dir_str, "analyze"]);
    run_bin(&["--sim-dir", test_dir_str, "clean"]);

    fs::remove_dir_all(&test_dir).ok();
}
