use std::sync::{Arc, Condvar, Mutex};

use crate::error::{ExitReason, JvmError, JvmResult};
use crate::keys::MethodId;
use crate::value::Value;

/// Captures everything needed to resume the caller after a callee returns:
/// its method, the index to resume at, the data-/reference-stack sizes to
/// truncate back to (discarding the callee's residue), and its full
/// local-variable vector.
#[derive(Debug)]
pub struct ReturnFrame {
    pub method: MethodId,
    pub resume_index: usize,
    pub data_stack_size: usize,
    pub reference_stack_size: usize,
    pub locals: Vec<Option<Value>>,
}

/// Signalled once by the thread's fetch-execute loop on completion; other
/// threads block on it via `Vm::wait_for_completion`.
#[derive(Debug, Default)]
pub struct CompletionSignal {
    done: Mutex<bool>,
    condvar: Condvar,
}

impl CompletionSignal {
    pub fn mark_done(&self) {
        let mut done = self.done.lock().unwrap();
        *done = true;
        self.condvar.notify_all();
    }

    pub fn wait(&self) {
        let mut done = self.done.lock().unwrap();
        while !*done {
            done = self.condvar.wait(done).unwrap();
        }
    }

    pub fn is_done(&self) -> bool {
        *self.done.lock().unwrap()
    }
}

/// Per-thread execution state: current method and instruction pointer, the
/// three stacks, locals, the branch-taken flag, and the exit-reason slot a
/// thread checks between instructions.
pub struct Thread {
    pub method: MethodId,
    pub pc: usize,
    data_stack: Vec<i32>,
    data_stack_capacity: usize,
    reference_stack: Vec<Value>,
    reference_stack_capacity: usize,
    pub call_stack: Vec<ReturnFrame>,
    pub locals: Vec<Option<Value>>,
    pub branch_taken: bool,
    pub exit_reason: Option<ExitReason>,
    pub completion: Arc<CompletionSignal>,
    /// Set from outside the thread to request an early exit. Checked by
    /// the fetch-execute loop between instructions; once set it is never
    /// cleared (setting it more than once from outside is unsupported).
    pub cancel: Arc<Mutex<Option<ExitReason>>>,
    /// Published by the fetch-execute loop just before it ends, mirroring
    /// `exit_reason` into a handle the owning `Vm` retains after the
    /// thread's own state is dropped, so `Vm::wait_for_completion` can
    /// report whether any thread ended abnormally.
    pub result: Arc<Mutex<Option<ExitReason>>>,
}

const CALL_STACK_CAPACITY: usize = 4096;

impl Thread {
    pub fn new(method: MethodId, max_stack: u16, locals: Vec<Option<Value>>) -> Self {
        Thread {
            method,
            pc: 0,
            data_stack: Vec::with_capacity(max_stack as usize),
            data_stack_capacity: max_stack as usize,
            reference_stack: Vec::new(),
            reference_stack_capacity: max_stack.max(1) as usize,
            call_stack: Vec::new(),
            locals,
            branch_taken: false,
            exit_reason: None,
            completion: Arc::new(CompletionSignal::default()),
            cancel: Arc::new(Mutex::new(None)),
            result: Arc::new(Mutex::new(None)),
        }
    }

    /// Checked by the driver between instructions; `Some` means the thread
    /// was asked to stop by another thread.
    pub fn cancellation(&self) -> Option<ExitReason> {
        self.cancel.lock().unwrap().clone()
    }

    // -- raw data stack (32-bit slots; long/double occupy two) -----------

    pub fn push_i32(&mut self, v: i32) -> JvmResult<()> {
        if self.data_stack.len() >= self.data_stack_capacity {
            return Err(JvmError::OperandStackOverflow);
        }
        self.data_stack.push(v);
        Ok(())
    }

    pub fn pop_i32(&mut self) -> JvmResult<i32> {
        self.data_stack.pop().ok_or(JvmError::OperandStackUnderflow)
    }

    /// Pushes `(low32, high32)` in that order, per the JVM's byte-order
    /// convention for two-slot values.
    pub fn push_i64(&mut self, v: i64) -> JvmResult<()> {
        let low = v as u32 as i32;
        let high = (v >> 32) as i32;
        self.push_i32(low)?;
        self.push_i32(high)
    }

    /// Pops high then low and reassembles using an unsigned low half, so
    /// the low word's sign bit never corrupts the high half.
    pub fn pop_i64(&mut self) -> JvmResult<i64> {
        let high = self.pop_i32()?;
        let low = self.pop_i32()?;
        Ok(((high as i64) << 32) | (low as u32 as i64))
    }

    pub fn push_f32(&mut self, v: f32) -> JvmResult<()> {
        self.push_i32(v.to_bits() as i32)
    }

    pub fn pop_f32(&mut self) -> JvmResult<f32> {
        Ok(f32::from_bits(self.pop_i32()? as u32))
    }

    pub fn push_f64(&mut self, v: f64) -> JvmResult<()> {
        self.push_i64(v.to_bits() as i64)
    }

    pub fn pop_f64(&mut self) -> JvmResult<f64> {
        Ok(f64::from_bits(self.pop_i64()? as u64))
    }

    pub fn data_stack_len(&self) -> usize {
        self.data_stack.len()
    }

    pub fn truncate_data_stack(&mut self, size: usize) {
        self.data_stack.truncate(size);
    }

    pub fn raw_data_slot(&self, from_top: usize) -> JvmResult<i32> {
        let len = self.data_stack.len();
        if from_top >= len {
            return Err(JvmError::OperandStackUnderflow);
        }
        Ok(self.data_stack[len - 1 - from_top])
    }

    pub fn pop_raw_slots(&mut self, n: usize) -> JvmResult<Vec<i32>> {
        if self.data_stack.len() < n {
            return Err(JvmError::OperandStackUnderflow);
        }
        Ok(self.data_stack.split_off(self.data_stack.len() - n))
    }

    pub fn push_raw_slots(&mut self, slots: &[i32]) -> JvmResult<()> {
        if self.data_stack.len() + slots.len() > self.data_stack_capacity {
            return Err(JvmError::OperandStackOverflow);
        }
        self.data_stack.extend_from_slice(slots);
        Ok(())
    }

    // -- reference stack ---------------------------------------------------

    /// Pushes a reference. `value` must be `Value::Null` or a non-primitive
    /// value; the invariant is enforced by callers choosing the right
    /// opcode family, not re-checked here (mirrors the data stack's lack of
    /// a runtime tag).
    pub fn push_ref(&mut self, value: Value) -> JvmResult<()> {
        if self.reference_stack.len() >= self.reference_stack_capacity {
            return Err(JvmError::OperandStackOverflow);
        }
        self.reference_stack.push(value);
        Ok(())
    }

    pub fn pop_ref(&mut self) -> JvmResult<Value> {
        self.reference_stack.pop().ok_or(JvmError::ReferenceStackUnderflow)
    }

    pub fn peek_ref(&self, from_top: usize) -> JvmResult<&Value> {
        let len = self.reference_stack.len();
        if from_top >= len {
            return Err(JvmError::ReferenceStackUnderflow);
        }
        Ok(&self.reference_stack[len - 1 - from_top])
    }

    pub fn reference_stack_len(&self) -> usize {
        self.reference_stack.len()
    }

    pub fn truncate_reference_stack(&mut self, size: usize) {
        self.reference_stack.truncate(size);
    }

    // -- call stack ---------------------------------------------------------

    pub fn push_frame(&mut self, frame: ReturnFrame) -> JvmResult<()> {
        if self.call_stack.len() >= CALL_STACK_CAPACITY {
            return Err(JvmError::CallStackOverflow);
        }
        self.call_stack.push(frame);
        Ok(())
    }

    pub fn pop_frame(&mut self) -> Option<ReturnFrame> {
        self.call_stack.pop()
    }

    // -- locals ---------------------------------------------------------------

    pub fn local(&self, index: u16) -> JvmResult<&Value> {
        self.locals
            .get(index as usize)
            .and_then(Option::as_ref)
            .ok_or(JvmError::LocalVariableUninitialized(index))
    }

    pub fn set_local(&mut self, index: u16, value: Value) -> JvmResult<()> {
        let slot = self
            .locals
            .get_mut(index as usize)
            .ok_or(JvmError::LocalVariableNotFound(index))?;
        *slot = Some(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread() -> Thread {
        Thread::new(MethodId(0), 16, Vec::new())
    }

    #[test]
    fn long_round_trips_through_two_slots() {
        let mut t = thread();
        let v: i64 = 0x1122334455667788;
        t.push_i64(v).unwrap();
        assert_eq!(t.data_stack_len(), 2);
        assert_eq!(t.pop_i64().unwrap(), v);
    }

    #[test]
    fn negative_long_low_half_does_not_corrupt_high_half() {
        let mut t = thread();
        let v: i64 = -1;
        t.push_i64(v).unwrap();
        assert_eq!(t.pop_i64().unwrap(), -1);
    }

    #[test]
    fn double_round_trips_through_bit_pattern() {
        let mut t = thread();
        t.push_f64(std::f64::consts::PI).unwrap();
        assert_eq!(t.pop_f64().unwrap(), std::f64::consts::PI);
    }

    #[test]
    fn stack_overflow_does_not_mutate_stack() {
        let mut t = Thread::new(MethodId(0), 1, Vec::new());
        t.push_i32(1).unwrap();
        let before = t.data_stack_len();
        assert!(matches!(t.push_i32(2), Err(JvmError::OperandStackOverflow)));
        assert_eq!(t.data_stack_len(), before);
    }

    #[test]
    fn pop_from_empty_stack_errors() {
        let mut t = thread();
        assert!(matches!(t.pop_i32(), Err(JvmError::OperandStackUnderflow)));
    }
}
