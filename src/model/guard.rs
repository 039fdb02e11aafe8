//! 存活守卫（canary）与节点竞技场
//!
//! 节点存放在竞技场槽位中，句柄 `NodeId` = 槽位号 + 代数。
//! 每个槽位保存一个由其“地址”推导出的校验值；释放槽位时校验值清零、代数加一，
//! 之后任何旧句柄都会在校验时得到 `DanglingReference`。

use std::fmt;

use crate::model::error::TreeError;

/// 混淆常量
const SCRAMBLE: u32 = 0xC213_30A5;
/// 槽位“地址”的对齐位数，计算校验值前移除
const ALIGN_BITS: u32 = 3;

/// 节点句柄，本身不拥有节点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    slot: u32,
    generation: u32,
}

impl NodeId {
    pub fn slot(self) -> u32 {
        self.slot
    }

    pub fn generation(self) -> u32 {
        self.generation
    }

    /// 槽位“地址”：槽位号与代数拼接后按对齐放大
    fn address(self) -> u64 {
        ((u64::from(self.generation) << 32) | u64::from(self.slot)) << ALIGN_BITS
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.slot, self.generation)
    }
}

/// 期望的校验值：去掉对齐位后折叠为32位，再与常量异或
fn good_canary(id: NodeId) -> u32 {
    let a = id.address() >> ALIGN_BITS;
    ((a as u32) ^ ((a >> 32) as u32).rotate_left(16)) ^ SCRAMBLE
}

/// 槽位的校验值。不随节点一起复制：总是按槽位重新计算
#[derive(Debug)]
struct Canary(u32);

impl Canary {
    fn new(id: NodeId) -> Self {
        Self(good_canary(id))
    }

    fn kill(&mut self) {
        self.0 = 0;
    }

    fn is_alive(&self, id: NodeId) -> bool {
        self.0 != 0 && self.0 == good_canary(id)
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    canary: Canary,
    value: Option<T>,
}

/// 带代数检查的竞技场
#[derive(Debug)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }
}

impl<T> Arena<T> {
    pub fn insert(&mut self, value: T) -> NodeId {
        self.live += 1;
        if let Some(slot) = self.free.pop() {
            let s = &mut self.slots[slot as usize];
            let id = NodeId {
                slot,
                generation: s.generation,
            };
            s.canary = Canary::new(id);
            s.value = Some(value);
            id
        } else {
            let id = NodeId {
                slot: self.slots.len() as u32,
                generation: 0,
            };
            self.slots.push(Slot {
                generation: 0,
                canary: Canary::new(id),
                value: Some(value),
            });
            id
        }
    }

    /// 校验句柄：槽位存在、校验值匹配、值未释放
    pub fn check(&self, id: NodeId) -> Result<(), TreeError> {
        match self.slots.get(id.slot as usize) {
            Some(s) if s.generation == id.generation && s.canary.is_alive(id) && s.value.is_some() => {
                Ok(())
            }
            _ => Err(TreeError::DanglingReference(id)),
        }
    }

    pub fn get(&self, id: NodeId) -> Result<&T, TreeError> {
        self.check(id)?;
        self.slots[id.slot as usize]
            .value
            .as_ref()
            .ok_or(TreeError::DanglingReference(id))
    }

    pub fn get_mut(&mut self, id: NodeId) -> Result<&mut T, TreeError> {
        self.check(id)?;
        self.slots[id.slot as usize]
            .value
            .as_mut()
            .ok_or(TreeError::DanglingReference(id))
    }

    /// 释放槽位，返回原值
    pub fn remove(&mut self, id: NodeId) -> Result<T, TreeError> {
        self.check(id)?;
        let s = &mut self.slots[id.slot as usize];
        let value = s.value.take().ok_or(TreeError::DanglingReference(id))?;
        s.canary.kill();
        s.generation = s.generation.wrapping_add(1);
        self.free.push(id.slot);
        self.live -= 1;
        Ok(value)
    }

    /// 所有存活的值，顺序为槽位顺序
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut().filter_map(|s| s.value.as_mut())
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut arena = Arena::default();
        let a = arena.insert("alpha");
        let b = arena.insert("bravo");
        assert_ne!(a, b);
        assert_eq!(*arena.get(a).unwrap(), "alpha");
        assert_eq!(*arena.get(b).unwrap(), "bravo");
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_stale_handle_is_rejected() {
        let mut arena = Arena::default();
        let a = arena.insert(1);
        assert_eq!(arena.remove(a).unwrap(), 1);
        assert_eq!(arena.get(a), Err(TreeError::DanglingReference(a)));

        // 槽位被复用后，旧句柄依旧失效
        let b = arena.insert(2);
        assert_eq!(a.slot(), b.slot(), "空闲槽位应被复用");
        assert_ne!(a.generation(), b.generation());
        assert!(arena.check(a).is_err(), "旧句柄不应通过校验");
        assert_eq!(*arena.get(b).unwrap(), 2);
    }

    #[test]
    fn test_values_mut_skips_freed_slots() {
        let mut arena = Arena::default();
        let a = arena.insert(1);
        let b = arena.insert(2);
        arena.insert(3);
        arena.remove(b).unwrap();
        for v in arena.values_mut() {
            *v *= 10;
        }
        assert_eq!(*arena.get(a).unwrap(), 10);
        assert_eq!(arena.values_mut().count(), 2);
    }

    #[test]
    fn test_foreign_handle_is_rejected() {
        let arena: Arena<i32> = Arena::default();
        let mut other = Arena::default();
        let id = other.insert(5);
        assert!(arena.get(id).is_err(), "越界句柄应被拒绝");
    }

    #[test]
    fn test_canary_depends_on_slot() {
        let mut arena = Arena::default();
        let a = arena.insert(());
        let b = arena.insert(());
        assert_ne!(good_canary(a), good_canary(b));
    }
}
