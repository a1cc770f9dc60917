use log::{debug, trace};

use crate::error::{ErrorKind, LispError, Result};
use crate::eval::Machine;
use crate::symbol::sym;
use crate::value::Value;

/// Evaluator state captured when a catch frame is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvSnapshot {
    pub binds: usize,
    pub ins: usize,
    pub outs: usize,
    pub args: usize,
    pub makes: usize,
}

/// One active catch region.
#[derive(Debug, Clone, Copy)]
pub struct CatchFrame {
    /// `None` for `finally` frames, which never match.
    pub tag: Option<Value>,
    /// Evaluated on every exit from the region; NIL for none.
    pub fin: Value,
    pub env: EnvSnapshot,
}

impl Machine {
    pub(crate) fn snapshot(&self) -> EnvSnapshot {
        EnvSnapshot {
            binds: self.binds.depth(),
            ins: self.ins.len(),
            outs: self.outs.len(),
            args: self.varargs.len(),
            makes: self.makes.len(),
        }
    }

    /// Put the environment back to `env`. Frames opened since are dropped,
    /// which closes their files and flushes their buffers.
    pub(crate) fn restore(&mut self, env: &EnvSnapshot) {
        self.binds.unbind_to(&mut self.symbols, env.binds);
        self.ins.truncate(env.ins);
        while self.outs.len() > env.outs {
            if let Some(mut out) = self.outs.pop() {
                // Nothing to report to: the region is already exiting.
                let _ = out.flush_frame();
            }
        }
        self.varargs.truncate(env.args);
        self.makes.truncate(env.makes);
    }

    /// Run `body` inside a catch region.
    ///
    /// On error the environment is restored to what it was on entry, `fin`
    /// is evaluated, and the error is resolved here if it matches `tag`;
    /// otherwise it keeps propagating to the enclosing region.
    pub fn catch<F>(&mut self, tag: Option<Value>, fin: Value, body: F) -> Result<Value>
    where
        F: FnOnce(&mut Machine) -> Result<Value>,
    {
        let env = self.snapshot();
        let level = self.catches.len();
        self.catches.push(CatchFrame { tag, fin, env });
        trace!("catch frame {} established", level);

        let result = body(self);

        self.catches.truncate(level);
        if result.is_err() {
            self.restore(&env);
        }
        if !fin.is_nil() {
            self.eval(fin)?;
        }
        match result {
            Ok(val) => Ok(val),
            Err(err) => match tag.and_then(|tag| self.resolve(tag, &err)) {
                Some(val) => {
                    debug!("catch frame {} resolved: {}", level, err);
                    Ok(val)
                }
                None => Err(err),
            },
        }
    }

    /// Run `body`, restoring the environment if it fails, and hand any error
    /// back unresolved. This is the driver's catch-all region.
    pub fn protect<F>(&mut self, body: F) -> Result<Value>
    where
        F: FnOnce(&mut Machine) -> Result<Value>,
    {
        let env = self.snapshot();
        let level = self.catches.len();
        let result = body(self);
        if let Err(err) = &result {
            self.catches.truncate(level);
            self.restore(&env);
            if let LispError::Error { msg, .. } = err {
                let msg = self.mk_str(msg);
                self.symbols.set_value(sym::MSG, msg);
            }
        }
        result
    }

    /// The value a frame tagged `tag` yields for `err`, if it catches it.
    fn resolve(&mut self, tag: Value, err: &LispError) -> Option<Value> {
        match err {
            LispError::Throw { tag: thrown, value } => {
                (tag.is_t() || tag == *thrown).then_some(*value)
            }
            LispError::Error { msg, .. } => {
                let hit = self.error_pattern(tag, msg)?;
                let msg = self.mk_str(msg);
                self.symbols.set_value(sym::MSG, msg);
                Some(if hit.is_nil() { msg } else { hit })
            }
            LispError::HeapExhausted { .. } | LispError::Bye(_) => None,
        }
    }

    /// The element of a list tag that matches `msg`: NIL matches anything,
    /// a string matches when it occurs in the message.
    fn error_pattern(&self, tag: Value, msg: &str) -> Option<Value> {
        self.list_items(tag).into_iter().find(|&pat| {
            pat.is_nil() || self.name_of(pat).map_or(false, |s| msg.contains(s.as_str()))
        })
    }

    /// Whether some active frame would catch a throw to `tag`.
    pub(crate) fn can_throw_to(&self, tag: Value) -> bool {
        self.catches
            .iter()
            .rev()
            .any(|frame| frame.tag.map_or(false, |t| t.is_t() || t == tag))
    }

    /// Throw `value` to the innermost frame tagged `tag`.
    pub fn throw(&self, ex: Value, tag: Value, value: Value) -> Result<Value> {
        if !self.can_throw_to(tag) {
            return Err(LispError::new(ErrorKind::TagNotFound, Some(ex), Some(tag)));
        }
        Err(LispError::Throw { tag, value })
    }

    /// Depth of the catch stack.
    pub fn catch_depth(&self) -> usize {
        self.catches.len()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::error::{ErrorKind, LispError};
    use crate::eval::Machine;
    use crate::io::OutFrame;
    use crate::value::Value;

    fn machine() -> Machine {
        Machine::new(Config::default()).unwrap()
    }

    #[test]
    fn unwinding_drops_frames_opened_inside_the_region() {
        let mut m = machine();
        let tag = m.intern("done");
        let v = m
            .catch(Some(tag), Value::NIL, |m| {
                m.push_output(OutFrame::Buffer(Vec::new()));
                m.eval_str("(make (link 1) (let X 5 (throw 'done X)))")
            })
            .unwrap();
        assert_eq!(v, Value::boxed(5));
        assert!(m.pop_output().is_none());
        assert!(m.makes.is_empty());
        assert_eq!(m.binds.depth(), 0);
    }

    #[test]
    fn fatal_errors_pass_every_frame() {
        let mut m = machine();
        let err = m
            .catch(Some(Value::T), Value::NIL, |_| Err(LispError::Bye(3)))
            .unwrap_err();
        assert!(matches!(err, LispError::Bye(3)));
        let any = m.eval_str("'(NIL)").unwrap();
        let err = m
            .catch(Some(any), Value::NIL, |_| Err(LispError::HeapExhausted { segments: 1 }))
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn unmatched_message_keeps_propagating() {
        let mut m = machine();
        let tags = m.eval_str("'(\"Div\")").unwrap();
        let err = m
            .catch(Some(tags), Value::NIL, |m| m.eval_str("(car 1)"))
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::ListExpected));
        assert_eq!(m.catch_depth(), 0);
    }
}
