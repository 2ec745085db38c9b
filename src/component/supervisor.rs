//! 组件生命周期监督器
//!
//! 以组件列表为输入做协调：按名称比较新旧配置，
//! 对新增组件 create+start，对变更组件 reload（必要时 stop 旧实例并 start 新实例），
//! 对已从列表中消失的组件 stop 并移除。

use crate::component::descriptor::{
    current_hostname, ComponentSpec, ComponentState, ComponentStatus, Descriptor,
};
use crate::component::manager::{Component, Manager, Reload};
use crate::component::registry::ManagerRegistry;
use crate::config::{Array, Section};
use crate::error::{ComponentError, Result};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// 启动批次的最小预算
pub const MIN_START_BUDGET: Duration = Duration::from_secs(1);

/// 启动批次中每个组件追加的预算
pub const PER_START_BUDGET: Duration = Duration::from_millis(50);

/// 启动前钩子：组件创建之后、启动之前调用
pub type PreStartHook = Arc<dyn Fn(&str, &Section) -> anyhow::Result<()> + Send + Sync>;

/// 组件生命周期监督器
pub struct Supervisor {
    /// 组件类型注册表
    registry: Arc<ManagerRegistry>,
    /// 在册组件，运行中的组件可能在协调期间并发查询
    components: DashMap<String, Descriptor>,
    /// 运行中组件的启动顺序；同时保证同一时刻只有一次协调
    order: Mutex<Vec<String>>,
    /// 主机白名单比较使用的主机名
    hostname: String,
    pre_start: Option<PreStartHook>,
    min_budget: Duration,
    per_start_budget: Duration,
}

impl Supervisor {
    /// 创建监督器
    ///
    /// # 参数
    /// * `registry` - 组件类型注册表
    pub fn new(registry: Arc<ManagerRegistry>) -> Self {
        Self {
            registry,
            components: DashMap::new(),
            order: Mutex::new(Vec::new()),
            hostname: current_hostname(),
            pre_start: None,
            min_budget: MIN_START_BUDGET,
            per_start_budget: PER_START_BUDGET,
        }
    }

    /// 指定主机名
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// 设置启动前钩子
    pub fn with_pre_start(mut self, hook: PreStartHook) -> Self {
        self.pre_start = Some(hook);
        self
    }

    /// 调整启动批次预算
    pub fn with_start_budget(mut self, min_budget: Duration, per_start: Duration) -> Self {
        self.min_budget = min_budget;
        self.per_start_budget = per_start;
        self
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn registry(&self) -> &Arc<ManagerRegistry> {
        &self.registry
    }

    /// 启动批次的共享预算：`max(最小预算, 组件数 × 单个预算)`
    pub fn start_budget(&self, count: usize) -> Duration {
        let scaled = self
            .per_start_budget
            .saturating_mul(u32::try_from(count).unwrap_or(u32::MAX));
        scaled.max(self.min_budget)
    }

    /// 按名称查找组件实例
    pub fn instance(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.components.get(name).and_then(|d| d.instance.clone())
    }

    /// 按名称查找在册记录
    pub fn descriptor(&self, name: &str) -> Option<Descriptor> {
        self.components.get(name).map(|d| d.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// 全部组件状态，按名称排序
    pub fn status(&self) -> Vec<ComponentStatus> {
        let mut statuses: Vec<ComponentStatus> =
            self.components.iter().map(|entry| entry.status()).collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// 运行中组件的启动顺序
    pub async fn start_order(&self) -> Vec<String> {
        self.order.lock().await.clone()
    }

    /// 解析全部条目：检查重名与未注册类型，不调用任何生命周期方法
    fn parse_entries(&self, entries: &Array) -> Result<Vec<(ComponentSpec, Arc<dyn Manager>)>> {
        let mut seen = HashSet::new();
        let mut parsed = Vec::with_capacity(entries.len());

        for section in entries.iter() {
            let spec = ComponentSpec::parse(&section?)?;
            if !seen.insert(spec.name.clone()) {
                return Err(ComponentError::DuplicateName { name: spec.name }.into());
            }
            let manager = self
                .registry
                .get(&spec.kind)
                .ok_or_else(|| ComponentError::UnknownType {
                    name: spec.name.clone(),
                    kind: spec.kind.clone(),
                })?;
            parsed.push((spec, manager));
        }
        Ok(parsed)
    }

    /// 只做解析与检查，不调用任何生命周期方法
    pub fn validate(&self, entries: &Array) -> Result<Vec<ComponentSpec>> {
        Ok(self
            .parse_entries(entries)?
            .into_iter()
            .map(|(spec, _)| spec)
            .collect())
    }

    /// 协调组件列表
    ///
    /// # 参数
    /// * `entries` - 新的组件列表
    /// * `initial` - 是否为首次加载，仅影响日志
    ///
    /// # 返回
    /// * `Result<()>` - 第一个遇到的错误；已启动的组件不会回滚
    pub async fn reconcile(&self, entries: &Array, initial: bool) -> Result<()> {
        let mut order = self.order.lock().await;
        let pass = if initial { "load" } else { "reload" };

        let parsed = self.parse_entries(entries)?;
        info!(pass, count = parsed.len(), "开始协调组件列表");

        let mut present = HashSet::with_capacity(parsed.len());
        let mut queue: Vec<String> = Vec::new();

        for (spec, manager) in parsed {
            let name = spec.name.clone();
            present.insert(name.clone());
            let existing = self.components.get(&name).map(|d| d.clone());

            if spec.disabled_on(&self.hostname) {
                if let Some(old) = existing {
                    self.stop_descriptor(&old, &mut order).await?;
                }
                info!(event = "disabled", component = %name, kind = %spec.kind, "组件已禁用");
                self.components
                    .insert(name, Descriptor::placeholder(spec, manager));
                continue;
            }

            match existing {
                Some(Descriptor {
                    instance: Some(instance),
                    kind,
                    config,
                    state,
                    ..
                }) if kind == spec.kind => {
                    if !config.diff_from(&spec.config) {
                        debug!(event = "unchanged", component = %name, kind = %kind, "配置未变化");
                        continue;
                    }

                    info!(event = "reloading", component = %name, kind = %kind, "重新加载组件");
                    let outcome = instance
                        .reload(&name, &spec.config)
                        .await
                        .map_err(|e| ComponentError::lifecycle(&name, "reload", &e))?;

                    match outcome {
                        Reload::InPlace => {
                            if let Some(mut descriptor) = self.components.get_mut(&name) {
                                descriptor.config = spec.config;
                            }
                            // 之前启动失败或被跳过的组件，配置变化后重新启动
                            if state != ComponentState::Running {
                                queue.push(name);
                            }
                        }
                        Reload::Replace(replacement) => {
                            if state == ComponentState::Running {
                                info!(event = "stopping", component = %name, kind = %kind, "停止被替换的实例");
                                instance
                                    .stop(&name)
                                    .await
                                    .map_err(|e| ComponentError::lifecycle(&name, "stop", &e))?;
                                order.retain(|n| n != &name);
                            }
                            self.components.insert(
                                name.clone(),
                                Descriptor::created(spec, manager, replacement),
                            );
                            queue.push(name);
                        }
                    }
                }
                existing => {
                    // 类型变化，或占位记录重新启用
                    if let Some(old) = existing {
                        self.stop_descriptor(&old, &mut order).await?;
                    }

                    info!(event = "new", component = %name, kind = %spec.kind, "创建组件");
                    let instance = manager
                        .create(&name, &spec.config)
                        .await
                        .map_err(|e| ComponentError::lifecycle(&name, "create", &e))?;
                    self.components
                        .insert(name.clone(), Descriptor::created(spec, manager, instance));
                    queue.push(name);
                }
            }
        }

        self.remove_absent(&present, &mut order).await?;
        self.start_batch(queue, &mut order).await
    }

    /// 停止并移除不在新列表中的组件，返回第一个错误
    async fn remove_absent(&self, present: &HashSet<String>, order: &mut Vec<String>) -> Result<()> {
        let absent: Vec<String> = self
            .components
            .iter()
            .filter(|entry| !present.contains(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        let mut first_error = None;
        for name in absent {
            let Some((_, descriptor)) = self.components.remove(&name) else {
                continue;
            };
            if let Err(e) = self.stop_descriptor(&descriptor, order).await {
                warn!("停止已移除组件 {} 失败: {}", name, e);
                first_error.get_or_insert(e);
            }
            info!(event = "removed", component = %name, kind = %descriptor.kind, "组件已移除");
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// 停止运行中的组件实例
    async fn stop_descriptor(&self, descriptor: &Descriptor, order: &mut Vec<String>) -> Result<()> {
        let Some(instance) = &descriptor.instance else {
            return Ok(());
        };
        if !descriptor.is_running() {
            return Ok(());
        }

        info!(event = "stopping", component = %descriptor.name, kind = %descriptor.kind, "停止组件");
        order.retain(|n| n != &descriptor.name);
        instance
            .stop(&descriptor.name)
            .await
            .map_err(|e| ComponentError::lifecycle(&descriptor.name, "stop", &e))?;
        Ok(())
    }

    /// 按入队顺序启动组件
    ///
    /// 整个批次共享一个截止时间，前面的慢启动会消耗后面组件的预算。
    /// 超过截止时间的启动任务会被取消并报告超时，剩余组件不再启动。
    async fn start_batch(&self, queue: Vec<String>, order: &mut Vec<String>) -> Result<()> {
        if queue.is_empty() {
            return Ok(());
        }

        let budget = self.start_budget(queue.len());
        let deadline = Instant::now() + budget;
        debug!("启动 {} 个组件，批次预算 {:?}", queue.len(), budget);

        for name in queue {
            let Some((instance, kind, config)) = self.components.get(&name).and_then(|d| {
                d.instance
                    .clone()
                    .map(|instance| (instance, d.kind.clone(), d.config.clone()))
            }) else {
                continue;
            };

            if let Some(hook) = &self.pre_start {
                hook(&name, &config).map_err(|e| ComponentError::lifecycle(&name, "pre-start", &e))?;
            }

            info!(event = "starting", component = %name, kind = %kind, "启动组件");
            let task_name = name.clone();
            let mut task = tokio::spawn(async move { instance.start(&task_name).await });

            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(Ok(()))) => {
                    if let Some(mut descriptor) = self.components.get_mut(&name) {
                        descriptor.state = ComponentState::Running;
                    }
                    order.push(name);
                }
                Ok(Ok(Err(e))) => {
                    return Err(ComponentError::lifecycle(&name, "start", &e).into());
                }
                Ok(Err(join_error)) => {
                    return Err(ComponentError::Lifecycle {
                        name,
                        action: "start",
                        message: join_error.to_string(),
                    }
                    .into());
                }
                Err(_) => {
                    task.abort();
                    warn!(component = %name, "组件启动超时，已取消启动任务");
                    return Err(ComponentError::Timeout { name, budget }.into());
                }
            }
        }
        Ok(())
    }

    /// 停止并移除单个组件
    ///
    /// # 返回
    /// * `Result<bool>` - 组件不存在时返回 false
    pub async fn unload(&self, name: &str) -> Result<bool> {
        let mut order = self.order.lock().await;
        let Some((_, descriptor)) = self.components.remove(name) else {
            return Ok(false);
        };
        self.stop_descriptor(&descriptor, &mut order).await?;
        info!(event = "removed", component = %name, kind = %descriptor.kind, "组件已卸载");
        Ok(true)
    }

    /// 按启动顺序的逆序停止全部组件并清空记录，返回第一个错误
    pub async fn unload_all(&self) -> Result<()> {
        let mut order = self.order.lock().await;
        let mut first_error = None;

        let running: Vec<String> = order.iter().rev().cloned().collect();
        for name in running {
            let Some((_, descriptor)) = self.components.remove(&name) else {
                continue;
            };
            if let Err(e) = self.stop_descriptor(&descriptor, &mut order).await {
                warn!("停止组件 {} 失败: {}", name, e);
                first_error.get_or_insert(e);
            }
        }

        self.components.clear();
        order.clear();
        info!("全部组件已卸载");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("hostname", &self.hostname)
            .field("components", &self.components.len())
            .finish()
    }
}
