//! ステップ実行の統合テスト
//!
//! Debugger を通して SimCore を動かし、各ステップ操作が止まる位置を確認する。

use zdb_core::{Debugger, DebuggerConfig, Emulator, RunResult, StepState};
use zdb_target::SimCore;

/// 9000: call 9100 / nop
/// 9100: call 9200 / ret
/// 9200: ret
fn nested_calls() -> SimCore {
    let mut core = SimCore::default();
    core.load_logical(0x9000, &[0xcd, 0x00, 0x91, 0x00]);
    core.load_logical(0x9100, &[0xcd, 0x00, 0x92, 0xc9]);
    core.load_logical(0x9200, &[0xc9]);
    core.regs_mut().pc = 0x9000;
    core.regs_mut().sp = 0xfff0;
    core
}

fn debugger(core: SimCore) -> Debugger {
    Debugger::new(Emulator::new(Some(Box::new(core))), DebuggerConfig::default())
}

fn pc_and_sp(debugger: &Debugger) -> (u16, u16) {
    let regs = debugger.registers().unwrap();
    (regs.pc, regs.sp)
}

#[test]
fn test_step_over_call_with_nested_calls() {
    let debugger = debugger(nested_calls());

    assert!(debugger.step_over());
    assert!(matches!(debugger.emulator().run_for(100), RunResult::Stopped(_)));
    assert_eq!(pc_and_sp(&debugger), (0x9003, 0xfff0));

    let machine = debugger.emulator().lock();
    assert_eq!(machine.stepper().state(), StepState::Idle);
    assert_eq!(machine.store().live_handles(), 0);
}

#[test]
fn test_step_into_enters_call() {
    let debugger = debugger(nested_calls());

    assert!(debugger.step_into());
    assert!(matches!(debugger.emulator().run_for(100), RunResult::Stopped(_)));
    assert_eq!(pc_and_sp(&debugger), (0x9100, 0xffee));
}

#[test]
fn test_finish_skips_nested_returns() {
    // 9100 の途中から抜ける: 戻り先 8000 をスタックに置く
    let mut core = nested_calls();
    core.regs_mut().pc = 0x9100;
    core.load_logical(0xfff0, &[0x00, 0x80]);
    let debugger = debugger(core);

    assert!(debugger.finish());
    assert!(matches!(debugger.emulator().run_for(100), RunResult::Stopped(_)));
    assert_eq!(pc_and_sp(&debugger), (0x8000, 0xfff2));
}

#[test]
fn test_step_into_halt_waits_for_interrupt() {
    let mut core = SimCore::default();
    core.load_logical(0x9000, &[0x76]);
    core.regs_mut().pc = 0x9000;
    core.regs_mut().iff1 = true;
    let debugger = debugger(core);

    assert!(debugger.step_into());
    assert_eq!(debugger.emulator().run_for(50), RunResult::Budget);
    assert!(debugger.registers().unwrap().halted);
    assert!(!debugger.emulator().is_paused());

    debugger.pause();
    assert_eq!(debugger.emulator().lock().stepper().state(), StepState::Idle);
}

#[test]
fn test_user_breakpoint_cancels_step_over() {
    let mut debugger = debugger(nested_calls());
    let id = debugger.add_or_edit_breakpoint("l x 9200", None).unwrap().unwrap();

    assert!(debugger.step_over());
    assert!(matches!(debugger.emulator().run_for(100), RunResult::Stopped(_)));
    assert_eq!(pc_and_sp(&debugger), (0x9200, 0xffec));

    let machine = debugger.emulator().lock();
    assert_eq!(machine.stepper().state(), StepState::Idle);
    assert_eq!(machine.store().get(id).unwrap().live_handles(), 1);
}

#[test]
fn test_steps_rejected_while_running() {
    let debugger = debugger(nested_calls());
    debugger.run();
    assert!(!debugger.step_into());
    assert!(!debugger.step_over());
    assert!(!debugger.finish());
    debugger.pause();
    assert!(debugger.step_into());
}

/// 9000 から `code` を step over し、停止したPCを返す
fn step_over_from(code: &[u8], setup: impl FnOnce(&mut SimCore)) -> u16 {
    let mut core = SimCore::default();
    core.load_logical(0x9000, code);
    core.regs_mut().pc = 0x9000;
    core.regs_mut().sp = 0xfff0;
    setup(&mut core);
    let debugger = debugger(core);

    assert!(debugger.step_over());
    assert!(matches!(debugger.emulator().run_for(100), RunResult::Stopped(_)));
    assert_eq!(debugger.emulator().lock().stepper().state(), StepState::Idle);
    debugger.registers().unwrap().pc
}

#[test]
fn test_step_over_untaken_conditional_call() {
    // call z,9200 (Z=0)
    let pc = step_over_from(&[0xcc, 0x00, 0x92, 0x00], |core| {
        core.load_logical(0x9200, &[0xc9]);
        core.regs_mut().set_f(0x00);
    });
    assert_eq!(pc, 0x9003);
}

#[test]
fn test_step_over_untaken_branch_stops_at_next() {
    // jr nz,9010 (Z=1)
    let pc = step_over_from(&[0x20, 0x0e, 0x00], |core| core.regs_mut().set_f(0x40));
    assert_eq!(pc, 0x9002);
}

#[test]
fn test_step_over_restart_returns_after_rst() {
    // rst 18h / 0018: ret
    let pc = step_over_from(&[0xdf, 0x00], |core| core.load_logical(0x0018, &[0xc9]));
    assert_eq!(pc, 0x9001);
}

#[test]
fn test_step_over_unconditional_jumps_land_at_destination() {
    // jp a000
    assert_eq!(step_over_from(&[0xc3, 0x00, 0xa0], |_| {}), 0xa000);
    // jr 9010
    assert_eq!(step_over_from(&[0x18, 0x0e], |_| {}), 0x9010);
}

#[test]
fn test_user_breakpoint_inside_conditional_call_cancels_step() {
    // call nz,9200 (Z=0) / 9200: ret
    let mut core = SimCore::default();
    core.load_logical(0x9000, &[0xc4, 0x00, 0x92, 0x00]);
    core.load_logical(0x9200, &[0xc9]);
    core.regs_mut().pc = 0x9000;
    core.regs_mut().sp = 0xfff0;
    core.regs_mut().set_f(0x00);
    let mut debugger = debugger(core);
    debugger.add_or_edit_breakpoint("l x 9200", None).unwrap();

    assert!(debugger.step_over());
    assert!(matches!(debugger.emulator().run_for(100), RunResult::Stopped(_)));
    assert_eq!(pc_and_sp(&debugger), (0x9200, 0xffee));
    {
        let machine = debugger.emulator().lock();
        assert_eq!(machine.stepper().state(), StepState::Idle);
        assert_eq!(machine.store().live_handles(), 1);
    }

    // 再開しても古いトランポリンでは止まらない
    debugger.run();
    assert_eq!(debugger.emulator().run_for(3), RunResult::Budget);
}
