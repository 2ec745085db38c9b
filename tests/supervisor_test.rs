//! 组件监督器集成测试

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use service_backbone::component::{
    register_builtin, Component, ComponentState, HelpDoc, Manager, ManagerRegistry, Reload,
    Supervisor,
};
use service_backbone::config::{Array, Section};
use service_backbone::error::{BackboneError, ComponentError};
use service_backbone::runtime::{Runtime, RuntimeOptions};
use std::fs::{self, File};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};
use tempfile::TempDir;

/// 按顺序记录生命周期调用，形如 `start:a`
#[derive(Default)]
struct Journal {
    events: Mutex<Vec<String>>,
}

impl Journal {
    fn push(&self, action: &str, name: &str) {
        self.events.lock().unwrap().push(format!("{action}:{name}"));
    }

    fn count(&self, action: &str, name: &str) -> usize {
        let wanted = format!("{action}:{name}");
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| **e == wanted)
            .count()
    }

    fn actions(&self, action: &str) -> Vec<String> {
        let prefix = format!("{action}:");
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| e.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

struct Recorder {
    journal: Arc<Journal>,
    hang: bool,
    fail: bool,
    delay: Option<Duration>,
    dropped: Arc<AtomicBool>,
}

impl Recorder {
    fn from_config(
        journal: &Arc<Journal>,
        dropped: &Arc<AtomicBool>,
        config: &Section,
    ) -> Result<Self> {
        Ok(Self {
            journal: Arc::clone(journal),
            hang: config.get_bool("hang")?.unwrap_or(false),
            fail: config.get_bool("fail")?.unwrap_or(false),
            delay: config.get_duration("delay")?,
            dropped: Arc::clone(dropped),
        })
    }
}

#[async_trait]
impl Component for Recorder {
    async fn start(&self, name: &str) -> Result<()> {
        self.journal.push("start", name);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(anyhow!("{name} 启动失败"));
        }
        if self.hang {
            let _flag = DropFlag(Arc::clone(&self.dropped));
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<()> {
        self.journal.push("stop", name);
        Ok(())
    }

    async fn reload(&self, name: &str, config: &Section) -> Result<Reload> {
        self.journal.push("reload", name);
        if config.get_bool("restart")?.unwrap_or(false) {
            return Ok(Reload::Replace(Arc::new(Recorder::from_config(
                &self.journal,
                &self.dropped,
                config,
            )?)));
        }
        Ok(Reload::InPlace)
    }
}

struct RecorderManager {
    journal: Arc<Journal>,
    dropped: Arc<AtomicBool>,
}

#[async_trait]
impl Manager for RecorderManager {
    async fn create(&self, name: &str, config: &Section) -> Result<Arc<dyn Component>> {
        self.journal.push("create", name);
        Ok(Arc::new(Recorder::from_config(
            &self.journal,
            &self.dropped,
            config,
        )?))
    }

    fn help(&self) -> HelpDoc {
        HelpDoc::new("记录生命周期调用的测试组件")
            .optional("restart", "bool", "重载时替换实例", Some("false"))
            .optional("hang", "bool", "启动永不返回", Some("false"))
            .optional("fail", "bool", "启动返回错误", Some("false"))
            .optional("delay", "duration", "启动前等待", None)
    }
}

struct Fixture {
    journal: Arc<Journal>,
    dropped: Arc<AtomicBool>,
    supervisor: Supervisor,
}

fn fixture() -> Fixture {
    let journal = Arc::new(Journal::default());
    let dropped = Arc::new(AtomicBool::new(false));
    let registry = ManagerRegistry::new();
    registry.register(
        "recorder",
        RecorderManager {
            journal: Arc::clone(&journal),
            dropped: Arc::clone(&dropped),
        },
    );
    Fixture {
        journal,
        dropped,
        supervisor: Supervisor::new(Arc::new(registry)).with_hostname("this-host"),
    }
}

fn components(yaml: &str) -> Array {
    Section::from_yaml(yaml)
        .unwrap()
        .get_array("components")
        .unwrap()
}

const THREE: &str = r#"
components:
- name: a
  type: recorder
- name: b
  type: recorder
  config:
    level: 1
- name: c
  type: recorder
"#;

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let f = fixture();
    f.supervisor.reconcile(&components(THREE), true).await.unwrap();
    f.supervisor.reconcile(&components(THREE), false).await.unwrap();
    f.supervisor.reconcile(&components(THREE), false).await.unwrap();

    for name in ["a", "b", "c"] {
        assert_eq!(f.journal.count("create", name), 1);
        assert_eq!(f.journal.count("start", name), 1);
        assert_eq!(f.journal.count("reload", name), 0);
        assert_eq!(f.journal.count("stop", name), 0);
    }
    assert_eq!(f.supervisor.start_order().await, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_reconcile_completeness() {
    let f = fixture();
    f.supervisor.reconcile(&components(THREE), true).await.unwrap();
    f.journal.clear();

    let next = r#"
components:
- name: b
  type: recorder
  config:
    level: 2
- name: c
  type: recorder
- name: d
  type: recorder
"#;
    f.supervisor.reconcile(&components(next), false).await.unwrap();

    assert_eq!(f.journal.count("stop", "a"), 1);
    assert!(!f.supervisor.contains("a"));

    assert_eq!(f.journal.count("create", "d"), 1);
    assert_eq!(f.journal.count("start", "d"), 1);

    assert_eq!(f.journal.count("reload", "b"), 1);
    assert_eq!(f.journal.count("stop", "b"), 0);
    assert_eq!(f.journal.count("start", "b"), 0);

    assert_eq!(f.journal.count("reload", "c"), 0);
    assert_eq!(f.supervisor.len(), 3);
}

#[tokio::test]
async fn test_replacement_stops_old_and_starts_new() {
    let f = fixture();
    f.supervisor.reconcile(&components(THREE), true).await.unwrap();
    let before = f.supervisor.instance("b").unwrap();
    f.journal.clear();

    let next = THREE.replace("level: 1", "level: 1\n    restart: true");
    f.supervisor.reconcile(&components(&next), false).await.unwrap();

    assert_eq!(f.journal.count("reload", "b"), 1);
    assert_eq!(f.journal.count("stop", "b"), 1);
    assert_eq!(f.journal.count("start", "b"), 1);
    assert_eq!(f.journal.count("create", "b"), 0);

    let after = f.supervisor.instance("b").unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(f.supervisor.start_order().await, vec!["a", "c", "b"]);
}

#[tokio::test]
async fn test_duplicate_names_fail_before_any_lifecycle_call() {
    let f = fixture();
    let doc = "components:\n- name: x\n  type: recorder\n- name: x\n  type: recorder\n";
    let err = f.supervisor.reconcile(&components(doc), true).await.unwrap_err();

    assert!(matches!(
        err,
        BackboneError::Component(ComponentError::DuplicateName { .. })
    ));
    assert!(f.journal.actions("create").is_empty());
    assert!(f.supervisor.is_empty());
}

#[test]
#[should_panic(expected = "recorder")]
fn test_duplicate_type_registration_panics() {
    let f = fixture();
    f.supervisor.registry().register(
        "recorder",
        RecorderManager {
            journal: Arc::clone(&f.journal),
            dropped: Arc::clone(&f.dropped),
        },
    );
}

#[tokio::test]
async fn test_host_filter_and_reenable() {
    let f = fixture();
    let doc = "components:\n- name: w\n  type: recorder\n  hosts: [other-host]\n";
    f.supervisor.reconcile(&components(doc), true).await.unwrap();

    assert_eq!(f.journal.count("create", "w"), 0);
    let descriptor = f.supervisor.descriptor("w").unwrap();
    assert_eq!(descriptor.state, ComponentState::Disabled);
    assert!(f.supervisor.instance("w").is_none());

    let doc = "components:\n- name: w\n  type: recorder\n  hosts: [other-host, THIS-HOST]\n";
    f.supervisor.reconcile(&components(doc), false).await.unwrap();
    assert_eq!(f.journal.count("create", "w"), 1);
    assert_eq!(f.journal.count("start", "w"), 1);
    assert_eq!(
        f.supervisor.descriptor("w").unwrap().state,
        ComponentState::Running
    );
}

#[tokio::test]
async fn test_start_timeout_cancels_hung_start() {
    let f = fixture();
    let doc = "components:\n- name: slow\n  type: recorder\n  config:\n    hang: true\n- name: next\n  type: recorder\n";

    let started = Instant::now();
    let err = f.supervisor.reconcile(&components(doc), true).await.unwrap_err();
    let elapsed = started.elapsed();

    match err {
        BackboneError::Component(ComponentError::Timeout { name, .. }) => assert_eq!(name, "slow"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(elapsed >= Duration::from_millis(900), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "elapsed {elapsed:?}");

    // 剩余组件不再启动
    assert_eq!(f.journal.count("start", "next"), 0);

    let mut cancelled = false;
    for _ in 0..50 {
        if f.dropped.load(Ordering::SeqCst) {
            cancelled = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(cancelled, "超时的启动任务没有被取消");
}

#[tokio::test]
async fn test_unload_all_in_reverse_start_order() {
    let f = fixture();
    f.supervisor.reconcile(&components(THREE), true).await.unwrap();
    f.supervisor.unload_all().await.unwrap();

    assert_eq!(f.journal.actions("stop"), vec!["c", "b", "a"]);
    assert!(f.supervisor.is_empty());
    assert!(f.supervisor.start_order().await.is_empty());
}

#[tokio::test]
async fn test_runtime_picks_up_included_list_changes() {
    let dir = TempDir::new().unwrap();
    let list = dir.path().join("list.yaml");
    fs::write(&list, "- name: hb\n  type: heartbeat\n  config:\n    interval: 1h\n").unwrap();
    let main = dir.path().join("backbone.yaml");
    fs::write(&main, "autoreload: true\ncomponents:\n- include_: list.yaml\n").unwrap();

    let registry = ManagerRegistry::new();
    register_builtin(&registry);
    let supervisor = Arc::new(Supervisor::new(Arc::new(registry)));

    let options = RuntimeOptions::new(&main).with_watch_period(Duration::from_millis(20));
    let runtime = Runtime::load(options, Arc::clone(&supervisor)).await.unwrap();
    assert_eq!(runtime.watched_files().len(), 2);

    fs::write(
        &list,
        "- name: hb\n  type: heartbeat\n  config:\n    interval: 1h\n- name: hb2\n  type: heartbeat\n  config:\n    interval: 1h\n",
    )
    .unwrap();
    File::options()
        .write(true)
        .open(&list)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(5))
        .unwrap();

    let mut reloaded = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if supervisor.contains("hb2") {
            reloaded = true;
            break;
        }
    }
    assert!(reloaded);

    runtime.shutdown().await.unwrap();
    assert!(supervisor.is_empty());
}

#[tokio::test]
async fn test_start_failure_skips_rest_without_rollback() {
    let f = fixture();
    let doc = r#"
components:
- name: a
  type: recorder
- name: b
  type: recorder
  config:
    fail: true
- name: c
  type: recorder
"#;
    let err = f.supervisor.reconcile(&components(doc), true).await.unwrap_err();

    match err {
        BackboneError::Component(ComponentError::Lifecycle { name, action, .. }) => {
            assert_eq!(name, "b");
            assert_eq!(action, "start");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // 失败之后的组件不再启动，已启动的组件不回滚
    assert_eq!(f.journal.count("start", "c"), 0);
    assert_eq!(f.journal.count("stop", "a"), 0);
    assert_eq!(
        f.supervisor.descriptor("a").unwrap().state,
        ComponentState::Running
    );
    assert_eq!(
        f.supervisor.descriptor("b").unwrap().state,
        ComponentState::Created
    );
    assert_eq!(
        f.supervisor.descriptor("c").unwrap().state,
        ComponentState::Created
    );
    assert_eq!(f.supervisor.start_order().await, vec!["a"]);
}

#[tokio::test]
async fn test_skipped_component_starts_after_in_place_change() {
    let f = fixture();
    let doc = r#"
components:
- name: a
  type: recorder
  config:
    fail: true
- name: b
  type: recorder
"#;
    assert!(f.supervisor.reconcile(&components(doc), true).await.is_err());
    assert_eq!(f.journal.count("start", "b"), 0);
    assert_eq!(
        f.supervisor.descriptor("b").unwrap().state,
        ComponentState::Created
    );

    let next = format!("{doc}  config:\n    level: 2\n");
    f.supervisor.reconcile(&components(&next), false).await.unwrap();

    assert_eq!(f.journal.count("reload", "b"), 1);
    assert_eq!(f.journal.count("create", "b"), 1);
    assert_eq!(f.journal.count("start", "b"), 1);
    assert_eq!(
        f.supervisor.descriptor("b").unwrap().state,
        ComponentState::Running
    );
    // 配置未变化的失败组件不重试
    assert_eq!(f.journal.count("start", "a"), 1);
    assert_eq!(f.supervisor.start_order().await, vec!["b"]);
}

#[tokio::test]
async fn test_start_deadline_is_shared_across_batch() {
    let f = fixture();
    let doc = r#"
components:
- name: slow
  type: recorder
  config:
    delay: 700ms
- name: second
  type: recorder
  config:
    delay: 500ms
- name: third
  type: recorder
"#;

    let started = Instant::now();
    let err = f.supervisor.reconcile(&components(doc), true).await.unwrap_err();
    let elapsed = started.elapsed();

    // 第二个组件单独看不超时，但批次预算已被第一个消耗
    match err {
        BackboneError::Component(ComponentError::Timeout { name, budget }) => {
            assert_eq!(name, "second");
            assert_eq!(budget, Duration::from_secs(1));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(elapsed >= Duration::from_millis(900), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1500), "elapsed {elapsed:?}");

    assert_eq!(
        f.supervisor.descriptor("slow").unwrap().state,
        ComponentState::Running
    );
    assert_eq!(f.journal.count("start", "third"), 0);
    assert_eq!(f.supervisor.start_order().await, vec!["slow"]);
}
