use tracing::{trace, warn};

use crate::error::{ExitReason, JvmError, JvmResult};
use crate::instruction::handlers;
use crate::thread::Thread;
use crate::vm::Vm;

/// The fetch-execute loop a JVM thread's OS thread runs until it either
/// returns from its initial method, is cancelled from outside, or hits an
/// error it can't recover from.
///
/// Optimization (decode + link) is performed lazily, the first time a
/// method's instructions are needed — matching `Method::is_optimized`'s
/// idempotent, once-per-method contract.
pub fn run(thread: &mut Thread, vm: &Vm) {
    loop {
        if let Some(reason) = thread.cancellation() {
            thread.exit_reason = Some(reason);
            break;
        }

        if let Err(e) = step(thread, vm) {
            warn!("uncaught error at pc {}: {}", thread.pc, e);
            thread.exit_reason = Some(ExitReason::UncaughtError(e.to_string()));
            break;
        }

        if thread.exit_reason.is_some() {
            break;
        }
    }
    *thread.result.lock().unwrap() = thread.exit_reason.clone();
}

#[hotpath::measure]
fn step(thread: &mut Thread, vm: &Vm) -> JvmResult<()> {
    let method = vm.method(thread.method);
    if !method.is_optimized() {
        crate::optimize::optimize(vm, method.owner, &method)?;
    }

    let instructions = method.instructions().expect("optimize always installs instructions");
    let instr = instructions
        .get(thread.pc)
        .ok_or(JvmError::ProgramCounterOutOfBounds(thread.pc))?
        .clone();

    trace!("pc {}: {}", thread.pc, instr);

    thread.branch_taken = false;
    handlers::execute(&instr, thread, vm)?;

    if thread.exit_reason.is_none() && !thread.branch_taken {
        thread.pc += 1;
    }
    Ok(())
}
