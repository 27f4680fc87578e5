/// Integration tests against a real interpreter
///
/// These verify the full sandbox path:
/// 1. Returned values come back through the result marker
/// 2. Prints from the submission do not corrupt the result
/// 3. Exceptions and syntax errors become runtime failures
/// 4. Infinite loops are killed at the timeout
/// 5. Output is capped and spawned processes die with the run
/// 6. Docker backend behaves like the process backend
///
/// Run with `cargo test -- --ignored` on a machine with `python3` (and Docker).

#[cfg(test)]
mod sandbox_tests {
    use crate::engine::{
        build_program, DockerBackend, IsolationBackend, ProcessBackend, SandboxRunner,
        MAX_CAPTURE_BYTES,
    };
    use crate::executor::Evaluator;
    use codegrade_common::config::{AnalysisLimits, DockerSettings};
    use codegrade_common::types::{ExecutionOutcome, ProblemSpec, TestStatus};
    use serde_json::json;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn process_runner() -> SandboxRunner {
        SandboxRunner::new(Arc::new(ProcessBackend::new("python3")))
    }

    const TWO_SUM: &str = r#"
def twoSum(nums, target):
    """Return indices of the two numbers adding up to target."""
    print("debugging output", nums)
    seen = {}
    for i, n in enumerate(nums):
        if target - n in seen:
            return [seen[target - n], i]
        seen[n] = i
    return []
"#;

    #[tokio::test]
    #[ignore] // Requires python3
    async fn test_process_success_with_noisy_stdout() {
        let outcome = process_runner()
            .run(TWO_SUM, "", "twoSum([2, 7, 11, 15], 9)", Duration::from_secs(5))
            .await;

        assert_eq!(outcome, ExecutionOutcome::Success(json!([0, 1])));
    }

    #[tokio::test]
    #[ignore] // Requires python3
    async fn test_process_sets_and_tuples_serialise() {
        let outcome = process_runner()
            .run("def f():\n    return {3, 1, 2}, (4, 5)\n", "", "f()", Duration::from_secs(5))
            .await;

        assert_eq!(outcome, ExecutionOutcome::Success(json!([[1, 2, 3], [4, 5]])));
    }

    #[tokio::test]
    #[ignore] // Requires python3
    async fn test_process_exception_is_runtime_failure() {
        let outcome = process_runner()
            .run("def f(x):\n    return 1 / x\n", "", "f(0)", Duration::from_secs(5))
            .await;

        assert_eq!(
            outcome,
            ExecutionOutcome::RuntimeFailure("ZeroDivisionError: division by zero".to_string())
        );
    }

    #[tokio::test]
    #[ignore] // Requires python3
    async fn test_process_syntax_error_is_runtime_failure() {
        let outcome = process_runner()
            .run("def f(x)\n    return x\n", "", "f(1)", Duration::from_secs(5))
            .await;

        match outcome {
            ExecutionOutcome::RuntimeFailure(message) => {
                assert!(message.starts_with("SyntaxError"), "got {}", message);
                assert!(!message.contains("Traceback"));
            }
            other => panic!("expected runtime failure, got {:?}", other),
        }
    }

    #[tokio::test]
    #[ignore] // Requires python3
    async fn test_process_infinite_loop_times_out() {
        let start = Instant::now();
        let outcome = process_runner()
            .run("def spin():\n    while True:\n        pass\n", "", "spin()", Duration::from_secs(1))
            .await;

        assert_eq!(outcome, ExecutionOutcome::Timeout);
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    #[ignore] // Requires python3
    async fn test_process_nan_is_rejected() {
        let outcome = process_runner()
            .run("def f():\n    return float('nan')\n", "", "f()", Duration::from_secs(5))
            .await;

        assert!(matches!(outcome, ExecutionOutcome::RuntimeFailure(msg) if msg.starts_with("ValueError")));
    }

    #[tokio::test]
    #[ignore] // Requires python3
    async fn test_preamble_is_visible_to_submission() {
        let preamble = "class ListNode:\n    def __init__(self, val):\n        self.val = val\n";
        let outcome = process_runner()
            .run("def head(v):\n    return ListNode(v).val\n", preamble, "head(7)", Duration::from_secs(5))
            .await;

        assert_eq!(outcome, ExecutionOutcome::Success(json!(7)));
    }

    #[tokio::test]
    #[ignore] // Requires python3
    async fn test_full_evaluation_with_real_interpreter() {
        let problem: ProblemSpec = serde_json::from_value(json!({
            "id": "001",
            "title": "Two Sum",
            "difficulty": "Easy",
            "testCases": [
                { "label": "basic", "args": "twoSum([2, 7, 11, 15], 9)", "expected": [0, 1] },
                { "label": "dupes", "args": "twoSum([3, 3], 6)", "expected": [0, 1] }
            ],
            "hiddenTestCases": [
                { "label": "negatives", "args": "twoSum([-1, -2, -3, -4, -5], -8)", "expected": [2, 4], "weight": 2 }
            ]
        }))
        .unwrap();

        let evaluator = Evaluator::new(process_runner(), AnalysisLimits::default());
        let report = evaluator.evaluate(TWO_SUM, &problem).await;

        assert_eq!(report.dimensions.correctness.score, 100);
        assert!(report
            .dimensions
            .correctness
            .test_results
            .iter()
            .all(|r| r.status == TestStatus::Passed));
    }

    #[tokio::test]
    #[ignore] // Requires python3
    async fn test_json_and_sys_need_no_import() {
        let outcome = process_runner()
            .run(
                "def info():\n    return json.loads('[1]') + [sys.maxsize > 0]\n",
                "",
                "info()",
                Duration::from_secs(5),
            )
            .await;

        assert_eq!(outcome, ExecutionOutcome::Success(json!([1, true])));
    }

    #[tokio::test]
    #[ignore] // Requires python3
    async fn test_huge_output_is_capped() {
        let submission = "def loud():\n    print('x' * 50_000_000)\n    return 1\n";

        let raw = ProcessBackend::new("python3")
            .execute_isolated(&build_program(submission, "", "loud()"), Duration::from_secs(20))
            .await
            .unwrap();
        assert!(!raw.timed_out);
        assert!(raw.stdout.len() <= MAX_CAPTURE_BYTES);

        let outcome = process_runner()
            .run(submission, "", "loud()", Duration::from_secs(20))
            .await;
        assert_eq!(outcome, ExecutionOutcome::Success(json!(1)));
    }

    /// Alive and not a zombie
    #[cfg(target_os = "linux")]
    fn process_alive(pid: u32) -> bool {
        std::fs::read_to_string(format!("/proc/{}/stat", pid))
            .map(|stat| {
                let state = stat.rsplit(')').next().unwrap_or("").trim_start();
                !state.starts_with('Z')
            })
            .unwrap_or(false)
    }

    /// Wait for the submission to report a pid through `path`
    #[cfg(target_os = "linux")]
    async fn read_pid(path: &Path) -> u32 {
        for _ in 0..100 {
            if let Ok(text) = std::fs::read_to_string(path) {
                if let Ok(pid) = text.trim().parse() {
                    return pid;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("submission never wrote {}", path.display());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    #[ignore] // Requires python3
    async fn test_forked_children_die_on_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("grandchild.pid");
        let submission = format!(
            "import os\nimport time\n\ndef spawn():\n    if os.fork() == 0:\n        with open('{}', 'w') as f:\n            f.write(str(os.getpid()))\n        time.sleep(30)\n        os._exit(0)\n    while True:\n        pass\n",
            pid_file.display()
        );

        let outcome = process_runner()
            .run(&submission, "", "spawn()", Duration::from_secs(1))
            .await;
        assert_eq!(outcome, ExecutionOutcome::Timeout);

        let pid = read_pid(&pid_file).await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!process_alive(pid), "forked process {} outlived the run", pid);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    #[ignore] // Requires python3
    async fn test_dropping_evaluation_kills_running_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("interpreter.pid");
        let submission = format!(
            "import os\n\ndef spin():\n    with open('{}', 'w') as f:\n        f.write(str(os.getpid()))\n    while True:\n        pass\n",
            pid_file.display()
        );
        let problem: ProblemSpec = serde_json::from_value(json!({
            "id": "spin",
            "title": "Spin",
            "testCases": [{ "args": "spin()", "expected": null }]
        }))
        .unwrap();
        let evaluator = Evaluator::new(
            process_runner().with_timeout(Duration::from_secs(60)),
            AnalysisLimits::default(),
        );

        let abandoned =
            tokio::time::timeout(Duration::from_secs(2), evaluator.evaluate(&submission, &problem)).await;
        assert!(abandoned.is_err());

        let pid = read_pid(&pid_file).await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!process_alive(pid), "interpreter {} outlived the cancelled evaluation", pid);
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_docker_backend_success_and_timeout() {
        let backend = DockerBackend::new(&DockerSettings::default())
            .expect("Failed to connect to Docker");
        let runner = SandboxRunner::new(Arc::new(backend));

        let outcome = runner
            .run(TWO_SUM, "", "twoSum([3, 2, 4], 6)", Duration::from_secs(10))
            .await;
        assert_eq!(outcome, ExecutionOutcome::Success(json!([1, 2])));

        let outcome = runner
            .run("def spin():\n    while True:\n        pass\n", "", "spin()", Duration::from_secs(2))
            .await;
        assert_eq!(outcome, ExecutionOutcome::Timeout);
    }
}
