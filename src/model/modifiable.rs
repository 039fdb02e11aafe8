//! 修改状态跟踪：未修改 / 暂时修改 / 已修改

use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ModState {
    #[default]
    Unmodified,
    /// 编辑进行中，尚未提交到模型
    Tentative,
    Modified,
}

/// 状态变化监听器，只在真正的状态转换时调用
pub trait ModListener {
    fn on_state_changed(&mut self, old: ModState, new: ModState);
}

#[derive(Default)]
pub struct Modifiable {
    state: ModState,
    listener: Option<Box<dyn ModListener>>,
}

impl fmt::Debug for Modifiable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Modifiable")
            .field("state", &self.state)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

impl Modifiable {
    pub fn state(&self) -> ModState {
        self.state
    }

    pub fn is_modified(&self) -> bool {
        self.state != ModState::Unmodified
    }

    pub fn set_listener(&mut self, listener: Option<Box<dyn ModListener>>) {
        self.listener = listener;
    }

    fn change_state(&mut self, new: ModState) -> bool {
        let old = self.state;
        if old == new {
            return false;
        }
        self.state = new;
        tracing::debug!("修改状态: {:?} -> {:?}", old, new);
        if let Some(l) = self.listener.as_mut() {
            l.on_state_changed(old, new);
        }
        true
    }

    /// 任意状态 → 已修改
    pub fn modify(&mut self) -> bool {
        self.change_state(ModState::Modified)
    }

    /// 未修改 → 暂时修改
    pub fn temp_modify(&mut self) -> bool {
        if self.state == ModState::Unmodified {
            self.change_state(ModState::Tentative)
        } else {
            false
        }
    }

    /// 暂时修改 → 未修改
    pub fn temp_revert(&mut self) -> bool {
        if self.state == ModState::Tentative {
            self.change_state(ModState::Unmodified)
        } else {
            false
        }
    }

    pub fn unmodify(&mut self) -> bool {
        self.change_state(ModState::Unmodified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Log(Rc<RefCell<Vec<(ModState, ModState)>>>);

    impl ModListener for Log {
        fn on_state_changed(&mut self, old: ModState, new: ModState) {
            self.0.borrow_mut().push((old, new));
        }
    }

    fn tracked() -> (Modifiable, Rc<RefCell<Vec<(ModState, ModState)>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut m = Modifiable::default();
        m.set_listener(Some(Box::new(Log(log.clone()))));
        (m, log)
    }

    #[test]
    fn test_transitions() {
        let (mut m, log) = tracked();
        assert!(m.temp_modify());
        assert_eq!(m.state(), ModState::Tentative);
        assert!(m.temp_revert());
        assert_eq!(m.state(), ModState::Unmodified);
        assert!(m.temp_modify());
        assert!(m.modify());
        assert!(!m.temp_revert(), "已修改状态不能撤回");
        assert!(!m.temp_modify());
        assert_eq!(m.state(), ModState::Modified);
        assert!(m.unmodify());
        assert_eq!(log.borrow().len(), 5);
    }

    #[test]
    fn test_listener_silent_on_no_op() {
        let (mut m, log) = tracked();
        assert!(!m.unmodify());
        assert!(!m.temp_revert());
        m.modify();
        assert!(!m.modify(), "重复修改不是状态转换");
        assert_eq!(
            *log.borrow(),
            vec![(ModState::Unmodified, ModState::Modified)]
        );
    }
}
