//! Provisioning tests against the recording sandbox.

use std::path::Path;
use std::sync::Arc;

use swe_harbor::harbor::{
    discover_tasks, resolve_environment, AgentAsset, EnvDefaults, HarborConfig, Provisioner,
    TaskInstance, TaskState,
};
use swe_harbor::sandbox::{RecordingSandbox, SandboxEvent};
use swe_harbor::{ProvisionError, SandboxError};

fn write_task(root: &Path, name: &str) -> TaskInstance {
    let dir = root.join(name);
    std::fs::create_dir_all(dir.join("environment/src")).unwrap();
    std::fs::create_dir_all(dir.join("tests")).unwrap();
    std::fs::write(dir.join("instruction.md"), "Fix the bug.").unwrap();
    std::fs::write(dir.join("environment/src/app.py"), "print('hi')").unwrap();
    std::fs::write(dir.join("tests/test_solution.py"), "def test(): pass").unwrap();
    TaskInstance::load(&dir).unwrap()
}

fn agent() -> AgentAsset {
    AgentAsset::from_bytes("test", b"#!/bin/sh\necho agent\n".to_vec())
}

fn staged_paths(events: &[SandboxEvent]) -> Vec<std::path::PathBuf> {
    events
        .iter()
        .filter_map(|e| match e {
            SandboxEvent::Upload {
                remote_path,
                local_path,
                ..
            } if remote_path.ends_with("/agent") => Some(local_path.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_setup_orders_assets_install_and_agent() {
    let root = tempfile::tempdir().unwrap();
    let task = write_task(root.path(), "clone-check");
    let sandbox = Arc::new(RecordingSandbox::new());
    let provisioner = Provisioner::new(
        sandbox.clone(),
        HarborConfig::default(),
        EnvDefaults::default(),
    );

    provisioner
        .setup(&TaskState::new("sb-1"), &task, &agent())
        .await
        .unwrap();

    let summaries: Vec<String> = sandbox.events().iter().map(|e| e.summary()).collect();
    assert_eq!(summaries.len(), 4);
    assert!(summaries[0].starts_with("upload /task/instruction.md"));
    assert!(summaries[1].starts_with("upload /app/ <- "));
    assert!(summaries[2].starts_with("exec   apt-get update"));
    assert!(summaries[3].starts_with("upload /app/agent"));

    for event in sandbox.events() {
        match &event {
            SandboxEvent::Exec { sandbox_id, .. }
            | SandboxEvent::Upload { sandbox_id, .. }
            | SandboxEvent::UploadDirectory { sandbox_id, .. } => assert_eq!(sandbox_id, "sb-1"),
        }
        if let SandboxEvent::UploadDirectory { local_dir, .. } = event {
            assert!(!local_dir.ends_with("tests"));
        }
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_agent_uploaded_executable_and_temp_removed() {
    let sandbox = Arc::new(RecordingSandbox::new());
    let provisioner = Provisioner::new(
        sandbox.clone(),
        HarborConfig::default(),
        EnvDefaults::default(),
    );

    provisioner
        .provision(&TaskState::new("sb"), &agent())
        .await
        .unwrap();

    let events = sandbox.events();
    let upload = events
        .iter()
        .find_map(|e| match e {
            SandboxEvent::Upload { bytes, mode, .. } => Some((bytes.clone(), *mode)),
            _ => None,
        })
        .unwrap();
    assert_eq!(upload.0, agent().bytes());
    assert_eq!(upload.1.map(|m| m & 0o777), Some(0o755));

    let staged = staged_paths(&events);
    assert_eq!(staged.len(), 1);
    assert!(!staged[0].exists());
}

#[tokio::test]
async fn test_temp_removed_when_upload_fails() {
    let sandbox = Arc::new(RecordingSandbox::new().failing_uploads());
    let provisioner = Provisioner::new(
        sandbox.clone(),
        HarborConfig::default(),
        EnvDefaults::default(),
    );

    let err = provisioner
        .provision(&TaskState::new("sb"), &agent())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProvisionError::Sandbox(SandboxError::UploadFailed { .. })
    ));

    let staged = staged_paths(&sandbox.events());
    assert_eq!(staged.len(), 1);
    assert!(!staged[0].exists());
}

#[tokio::test]
async fn test_custom_workdir_and_install_command() {
    let sandbox = Arc::new(RecordingSandbox::new());
    let config = HarborConfig::default()
        .with_agent_workdir("/work")
        .with_install_command("true");
    let provisioner = Provisioner::new(sandbox.clone(), config, EnvDefaults::default());

    provisioner
        .provision(&TaskState::new("sb"), &agent())
        .await
        .unwrap();

    let summaries: Vec<String> = sandbox.events().iter().map(|e| e.summary()).collect();
    assert_eq!(summaries[0], "exec   true");
    assert!(summaries[1].starts_with("upload /work/agent"));
}

#[test]
fn test_resolve_never_overwrites_injected_values() {
    let defaults = EnvDefaults::from_lookup(|_| Some("sk-or-host".to_string()));
    let state = TaskState::new("sb")
        .with_env("OPENAI_BASE_URL", "http://interceptor:9000/v1")
        .with_env("OPENAI_API_KEY", "rollout-token")
        .with_env("OPENAI_MODEL", "policy");

    let env = resolve_environment(&state, &defaults);
    assert_eq!(env.base_url(), Some("http://interceptor:9000/v1"));
    assert_eq!(env.api_key(), Some("rollout-token"));
    assert_eq!(env.model(), Some("policy"));
    assert_eq!(env, resolve_environment(&state, &defaults));

    let bare = resolve_environment(&TaskState::new("sb"), &defaults);
    assert_eq!(bare.api_key(), Some("sk-or-host"));
    assert_eq!(bare.base_url(), Some("https://openrouter.ai/api/v1"));
}

#[test]
fn test_discover_tasks_loads_layout() {
    let root = tempfile::tempdir().unwrap();
    write_task(root.path(), "b-task");
    write_task(root.path(), "a-task");

    let tasks = discover_tasks(root.path(), &[]).unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].name, "a-task");
    assert!(tasks[0].environment_dir.is_some());
    assert!(tasks[0].tests_dir.is_some());
}
