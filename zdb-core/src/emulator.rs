//! エミュレータのロックと実行ループ
//!
//! CPUコア、ブレークポイントストア、ステップコントローラは一つのロック（[`Machine`]）の下にまとめられます。
//! ワーカースレッドはロックを1命令ごとに取得し、ステップコントローラをトリガーテストとしてコアに渡します。
//! コマンド側（REPLやUI）はブレークポイントの登録やレジスタの読み取りのたびにロックを取得します。

use crate::{BreakpointStore, StepController};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use zdb_target::{CoreHandle, CpuCore, DisassemblyService, ExecOutcome};

/// ロックで保護されるエミュレータの状態
pub struct Machine {
    core: Option<Box<dyn CpuCore>>,
    paused: bool,
    stepper: StepController,
    store: BreakpointStore,
    last_stop: Option<CoreHandle>,
}

impl Machine {
    fn new(core: Option<Box<dyn CpuCore>>) -> Self {
        Self {
            core,
            paused: true,
            stepper: StepController::new(),
            store: BreakpointStore::new(),
            last_stop: None,
        }
    }

    /// CPUコア
    pub fn core(&self) -> Option<&dyn CpuCore> {
        self.core.as_deref()
    }

    pub fn core_mut(&mut self) -> Option<&mut (dyn CpuCore + 'static)> {
        self.core.as_deref_mut()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn stepper(&self) -> &StepController {
        &self.stepper
    }

    pub fn store(&self) -> &BreakpointStore {
        &self.store
    }

    /// コアとストアを同時に借用する
    pub fn store_mut(&mut self) -> Option<(&mut (dyn CpuCore + 'static), &mut BreakpointStore)> {
        let core = self.core.as_deref_mut()?;
        Some((core, &mut self.store))
    }

    /// 最後に停止したときのブレークポイント
    pub fn last_stop(&self) -> Option<CoreHandle> {
        self.last_stop
    }

    /// コアを差し替える
    ///
    /// 古いコアに登録されたブレークポイントとステップセッションは全て解除されます。
    pub fn replace_core(&mut self, core: Option<Box<dyn CpuCore>>) -> Option<Box<dyn CpuCore>> {
        self.reset_breakpoints();
        self.paused = true;
        self.last_stop = None;
        std::mem::replace(&mut self.core, core)
    }

    /// 全てのブレークポイントとステップセッションを解除する
    pub fn reset_breakpoints(&mut self) {
        match self.core.as_deref_mut() {
            Some(core) => {
                self.stepper.cancel(core);
                self.store.clear(core);
            }
            None => {
                self.stepper.forget();
                self.store.forget();
            }
        }
    }

    /// ステップ開始の前提条件（コアがあり、停止中であること）
    fn can_step(&self) -> bool {
        if self.core.is_none() {
            tracing::debug!("step ignored: no core attached");
            return false;
        }
        if !self.paused {
            tracing::debug!("step ignored: emulator is running");
            return false;
        }
        true
    }

    /// step into を開始する
    pub fn step_into(&mut self) -> bool {
        if !self.can_step() {
            return false;
        }
        let Some(core) = self.core.as_deref_mut() else {
            return false;
        };
        let started = self.stepper.begin_into(core);
        self.resume_if(started)
    }

    /// step over を開始する
    pub fn step_over(&mut self, disasm: &dyn DisassemblyService) -> bool {
        if !self.can_step() {
            return false;
        }
        let Some(core) = self.core.as_deref_mut() else {
            return false;
        };
        let started = self.stepper.begin_over(core, disasm);
        self.resume_if(started)
    }

    /// finish を開始する
    pub fn finish(&mut self) -> bool {
        if !self.can_step() {
            return false;
        }
        let Some(core) = self.core.as_deref_mut() else {
            return false;
        };
        let started = self.stepper.begin_finish(core);
        self.resume_if(started)
    }

    fn resume_if(&mut self, started: bool) -> bool {
        if started {
            self.paused = false;
        }
        started
    }

    /// ステップセッションを解除して実行を再開する
    pub fn run(&mut self) {
        if let Some(core) = self.core.as_deref_mut() {
            self.stepper.cancel(core);
            self.paused = false;
        }
    }

    /// ステップセッションを解除して停止する
    pub fn pause(&mut self) {
        if let Some(core) = self.core.as_deref_mut() {
            self.stepper.cancel(core);
        }
        self.paused = true;
    }

    /// 1命令実行する（停止中やコアがない場合は None）
    pub fn execute_one(&mut self) -> Option<ExecOutcome> {
        if self.paused {
            return None;
        }
        let Some(core) = self.core.as_deref_mut() else {
            self.paused = true;
            return None;
        };

        let outcome = core.execute(&mut self.stepper);
        if let ExecOutcome::Break(handle) = outcome {
            // ユーザーのブレークポイントで止まった場合もステップは終了する
            self.stepper.cancel(core);
            self.paused = true;
            self.last_stop = Some(handle);
            tracing::debug!(handle = handle.0, pc = core.registers().pc, "execution stopped");
        }
        Some(outcome)
    }
}

/// `run_for` の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunResult {
    /// ブレークポイントまたはステップにより停止した
    Stopped(CoreHandle),
    /// 命令数の上限に達した（実行中のまま）
    Budget,
    /// 実行されなかった（停止中またはコアなし）
    Idle,
}

struct Shared {
    machine: Mutex<Machine>,
    changed: Condvar,
    shutdown: AtomicBool,
}

/// エミュレータ
///
/// [`Machine`] を共有するハンドルです。クローンは同じエミュレータを指します。
#[derive(Clone)]
pub struct Emulator {
    shared: Arc<Shared>,
}

impl Emulator {
    /// エミュレータを作成する（停止状態で開始）
    pub fn new(core: Option<Box<dyn CpuCore>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                machine: Mutex::new(Machine::new(core)),
                changed: Condvar::new(),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// ロックを取得する
    pub fn lock(&self) -> MutexGuard<'_, Machine> {
        self.shared.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// ロックを取得して操作し、状態の変化を通知する
    pub fn with<R>(&self, f: impl FnOnce(&mut Machine) -> R) -> R {
        let result = f(&mut self.lock());
        self.shared.changed.notify_all();
        result
    }

    /// 実行を再開する
    pub fn run(&self) {
        self.with(Machine::run);
    }

    /// 実行を停止する
    pub fn pause(&self) {
        self.with(Machine::pause);
    }

    pub fn is_paused(&self) -> bool {
        self.lock().is_paused()
    }

    /// 呼び出し元のスレッドで最大 `max` 命令実行する
    pub fn run_for(&self, max: u64) -> RunResult {
        for _ in 0..max {
            let outcome = self.lock().execute_one();
            match outcome {
                None => return RunResult::Idle,
                Some(ExecOutcome::Break(handle)) => {
                    self.shared.changed.notify_all();
                    return RunResult::Stopped(handle);
                }
                Some(ExecOutcome::Continue) => {}
            }
        }
        RunResult::Budget
    }

    /// 停止するまで待つ。タイムアウトした場合は false
    pub fn wait_paused(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut machine = self.lock();
        while !machine.is_paused() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            machine = match self.shared.changed.wait_timeout(machine, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    /// 実行ループのワーカースレッドを起動する
    pub fn spawn_worker(&self) -> Worker {
        let shared = Arc::clone(&self.shared);
        let thread = std::thread::spawn(move || worker_loop(&shared));
        Worker {
            emulator: self.clone(),
            thread: Some(thread),
        }
    }
}

fn worker_loop(shared: &Shared) {
    tracing::debug!("emulator worker started");
    loop {
        let mut machine = shared.machine.lock().unwrap_or_else(PoisonError::into_inner);
        while machine.is_paused() && !shared.shutdown.load(Ordering::Acquire) {
            machine = shared.changed.wait(machine).unwrap_or_else(PoisonError::into_inner);
        }
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }

        if machine.execute_one() != Some(ExecOutcome::Continue) {
            drop(machine);
            shared.changed.notify_all();
        }
    }
    tracing::debug!("emulator worker stopped");
}

/// ワーカースレッドのハンドル
///
/// 破棄するとスレッドを停止して合流します。
pub struct Worker {
    emulator: Emulator,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    /// ワーカースレッドを停止する
    pub fn shutdown(&mut self) {
        let shared = &self.emulator.shared;
        shared.shutdown.store(true, Ordering::Release);
        shared.changed.notify_all();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("emulator worker panicked");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
