#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

const STACK: &str = "AwsEcsTaskPipelineExampleStack";

fn taskchain(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("taskchain").unwrap();
    cmd.current_dir(dir.path())
        .env("TASKCHAIN_ROOT", dir.path())
        .env_remove("CDK_DEFAULT_ACCOUNT")
        .env_remove("CDK_DEFAULT_REGION")
        .env_remove("RUST_LOG");
    cmd
}

fn record_path() -> String {
    format!(".taskchain/deployments/123456789012/us-east-1/{STACK}.json")
}

fn json_output(cmd: &mut Command) -> Value {
    let out = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&out).unwrap()
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

#[test]
fn init_writes_config_and_gitignore() {
    let dir = TempDir::new().unwrap();
    taskchain(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("created: .taskchain/config.yaml"));

    assert!(dir.path().join(".taskchain/config.yaml").exists());
    let gitignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
    assert!(gitignore.lines().any(|l| l == "taskchain.out/"));
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    taskchain(&dir).arg("init").assert().success();
    taskchain(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:  .taskchain/config.yaml"));

    let gitignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
    assert_eq!(gitignore.matches("taskchain.out/").count(), 1);
}

// ---------------------------------------------------------------------------
// synth / ls
// ---------------------------------------------------------------------------

#[test]
fn synth_works_without_init() {
    let dir = TempDir::new().unwrap();
    taskchain(&dir)
        .arg("synth")
        .assert()
        .success()
        .stdout(predicate::str::contains(STACK));

    let path = dir
        .path()
        .join("taskchain.out")
        .join(format!("{STACK}.template.json"));
    let template: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    let resources = template["Resources"].as_object().unwrap();
    let count_of = |ty: &str| resources.values().filter(|r| r["Type"] == ty).count();
    assert_eq!(count_of("AWS::ECS::Cluster"), 2);
    assert_eq!(count_of("AWS::ECS::TaskDefinition"), 2);
    assert_eq!(count_of("AWS::Events::Rule"), 3);
    assert_eq!(count_of("AWS::Lambda::Function"), 1);
}

#[test]
fn synth_is_deterministic() {
    let dir = TempDir::new().unwrap();
    let first = taskchain(&dir)
        .args(["synth", "--stdout"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let second = taskchain(&dir)
        .args(["synth", "--stdout"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(first, second);
}

#[test]
fn synth_honours_region_override() {
    let dir = TempDir::new().unwrap();
    taskchain(&dir)
        .args(["synth", "--stdout", "--region", "eu-west-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("eu-west-1a"))
        .stdout(predicate::str::contains("us-east-1a").not());
}

#[test]
fn ls_lists_resource_types() {
    let dir = TempDir::new().unwrap();
    taskchain(&dir)
        .arg("ls")
        .assert()
        .success()
        .stdout(predicate::str::contains("LOGICAL ID"))
        .stdout(predicate::str::contains("AWS::EC2::VPC"))
        .stdout(predicate::str::contains("AWS::ECS::TaskDefinition"));
}

// ---------------------------------------------------------------------------
// diff / deploy / destroy
// ---------------------------------------------------------------------------

#[test]
fn diff_against_nothing_deployed_fails_with_flag() {
    let dir = TempDir::new().unwrap();
    taskchain(&dir)
        .arg("diff")
        .assert()
        .success()
        .stdout(predicate::str::contains("to add"));
    taskchain(&dir)
        .args(["diff", "--fail"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("has differences"));
}

#[test]
fn deploy_then_redeploy_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let first = json_output(taskchain(&dir).args(["deploy", "--json"]));
    assert_eq!(first["applied"], true);
    let changes = first["diff"]["resources"].as_array().unwrap();
    assert!(!changes.is_empty());
    assert!(changes.iter().all(|c| c["kind"] == "add"));
    assert!(dir
        .path()
        .join(record_path())
        .exists());

    let second = json_output(taskchain(&dir).args(["deploy", "--json"]));
    assert_eq!(second["applied"], false);

    taskchain(&dir)
        .args(["diff", "--fail"])
        .assert()
        .success()
        .stdout(predicate::str::contains("There were no differences"));
}

#[test]
fn deploy_to_another_account_is_a_fresh_deployment() {
    let dir = TempDir::new().unwrap();
    taskchain(&dir).arg("deploy").assert().success();

    let other = json_output(taskchain(&dir).args(["deploy", "--json", "--account", "999999999999"]));
    assert_eq!(other["applied"], true);
    assert!(other["diff"]["resources"]
        .as_array()
        .unwrap()
        .iter()
        .all(|c| c["kind"] == "add"));
    assert!(dir
        .path()
        .join(format!(".taskchain/deployments/999999999999/us-east-1/{STACK}.json"))
        .exists());
    assert!(dir.path().join(record_path()).exists());
}

#[test]
fn changed_image_shows_replacements() {
    let dir = TempDir::new().unwrap();
    taskchain(&dir).arg("init").assert().success();
    taskchain(&dir).arg("deploy").assert().success();

    let config_path = dir.path().join(".taskchain/config.yaml");
    let config = std::fs::read_to_string(&config_path).unwrap();
    let config = config.replace("otajisan/spring-batch-kotlin-example", "acme/batch:2");
    std::fs::write(&config_path, config).unwrap();

    taskchain(&dir)
        .arg("diff")
        .assert()
        .success()
        .stdout(predicate::str::contains("(replace)"))
        .stdout(predicate::str::contains("2 to change (2 replaced)"));
}

#[test]
fn destroy_requires_force() {
    let dir = TempDir::new().unwrap();
    taskchain(&dir).arg("deploy").assert().success();

    taskchain(&dir)
        .arg("destroy")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
    assert!(dir
        .path()
        .join(record_path())
        .exists());

    taskchain(&dir)
        .args(["destroy", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("destroyed"));
    assert!(!dir
        .path()
        .join(record_path())
        .exists());
}

#[test]
fn destroy_without_deployment_fails() {
    let dir = TempDir::new().unwrap();
    taskchain(&dir)
        .args(["destroy", "--force"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not deployed"));
}

// ---------------------------------------------------------------------------
// schedule / simulate
// ---------------------------------------------------------------------------

#[test]
fn schedule_lists_upcoming_fires() {
    let dir = TempDir::new().unwrap();
    let out = json_output(taskchain(&dir).args(["schedule", "--count", "3", "--json"]));
    let rules = out.as_array().unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0]["expression"], "cron(*/10 * * * ? *)");
    assert_eq!(rules[0]["next"].as_array().unwrap().len(), 3);
}

#[test]
fn simulate_upstream_stop_fires_both_rules() {
    let dir = TempDir::new().unwrap();
    let out = json_output(taskchain(&dir).args(["simulate", "--json"]));
    let fired = out["dispatched"].as_array().unwrap();
    assert_eq!(fired.len(), 2);
    assert_eq!(fired[0]["target"]["type"], "invoke_handler");
    assert_eq!(fired[1]["target"]["type"], "run_task");
    assert_eq!(fired[1]["rule_name"], "rule-launch-ecs-task-b");
}

#[test]
fn simulate_downstream_stop_fires_nothing() {
    let dir = TempDir::new().unwrap();
    taskchain(&dir)
        .args(["simulate", "--stopped-cluster", "ecs-task-b-cluster"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No rules matched."));
}

#[test]
fn simulate_other_reason_fires_nothing() {
    let dir = TempDir::new().unwrap();
    taskchain(&dir)
        .args([
            "simulate",
            "--stopped-cluster",
            "ecs-task-a-cluster",
            "--reason",
            "Task stopped by user",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("No rules matched."));
}

#[test]
fn simulate_reads_event_file() {
    let dir = TempDir::new().unwrap();
    let event = serde_json::json!({
        "source": "aws.ecs",
        "detail-type": "ECS Task State Change",
        "detail": {
            "clusterArn": "arn:aws:ecs:us-east-1:123456789012:cluster/ecs-task-a-cluster",
            "lastStatus": "STOPPED",
            "stoppedReason": "Essential container in task exited",
        },
    });
    let path = dir.path().join("event.json");
    std::fs::write(&path, event.to_string()).unwrap();

    taskchain(&dir)
        .args(["simulate", "--event"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("rule-launch-ecs-task-b"))
        .stdout(predicate::str::contains("EcsTaskPipelineExampleDebugLambda"));
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

#[test]
fn config_validate_default_is_clean() {
    let dir = TempDir::new().unwrap();
    taskchain(&dir).arg("init").assert().success();
    taskchain(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_rejects_same_upstream_and_downstream() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join(".taskchain")).unwrap();
    std::fs::write(
        dir.path().join(".taskchain/config.yaml"),
        "pipeline:\n  upstream: job\n  downstream: job\n",
    )
    .unwrap();

    taskchain(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"));
}

#[test]
fn config_validate_rejects_unsupported_task_shape() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join(".taskchain")).unwrap();
    std::fs::write(
        dir.path().join(".taskchain/config.yaml"),
        "pipeline:\n  shape:\n    cpu: 256\n    memory_mib: 4096\n",
    )
    .unwrap();

    taskchain(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("not a supported combination"));
}
