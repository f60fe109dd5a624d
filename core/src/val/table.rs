use std::rc::Rc;

use anyhow::{Result, anyhow};

use crate::util::fast_map::{FastHashMap, fast_hash_map_new};
use crate::val::{Val, float_to_integer};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(Rc<str>),
    Ref(usize),
}

/// Insertion-ordered table.
///
/// Entries live in a vector indexed by a hash map so that `next` walks them in a
/// stable order. Assigning nil keeps the slot as a tombstone, which keeps an
/// in-progress traversal valid when fields are cleared during it; tombstones are
/// only compacted away when a new key is inserted.
#[derive(Default)]
pub struct Table {
    entries: Vec<(Val, Val)>,
    index: FastHashMap<Key, usize>,
    dead: usize,
}

fn normalize(key: &Val) -> Val {
    match key {
        Val::Float(f) => match float_to_integer(*f) {
            Some(i) => Val::Int(i),
            None => key.clone(),
        },
        _ => key.clone(),
    }
}

fn key_of(key: &Val) -> Option<Key> {
    match key {
        Val::Nil => None,
        Val::Bool(b) => Some(Key::Bool(*b)),
        Val::Int(i) => Some(Key::Int(*i)),
        Val::Float(f) => match float_to_integer(*f) {
            Some(i) => Some(Key::Int(i)),
            None if f.is_nan() => None,
            None => Some(Key::Float(f.to_bits())),
        },
        Val::Str(s) => Some(Key::Str(s.clone())),
        other => other.addr().map(Key::Ref),
    }
}

impl Table {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: fast_hash_map_new(),
            dead: 0,
        }
    }

    pub fn get(&self, key: &Val) -> Val {
        match key_of(key).and_then(|k| self.index.get(&k)) {
            Some(&i) => self.entries[i].1.clone(),
            None => Val::Nil,
        }
    }

    pub fn get_str(&self, key: &str) -> Val {
        self.get(&Val::Str(Rc::from(key)))
    }

    pub fn get_int(&self, key: i64) -> Val {
        self.get(&Val::Int(key))
    }

    pub fn set(&mut self, key: Val, value: Val) -> Result<()> {
        let k = match key_of(&key) {
            Some(k) => k,
            None if key.is_nil() => return Err(anyhow!("table index is nil")),
            None => return Err(anyhow!("table index is NaN")),
        };
        if let Some(&i) = self.index.get(&k) {
            let slot = &mut self.entries[i].1;
            match (slot.is_nil(), value.is_nil()) {
                (false, true) => self.dead += 1,
                (true, false) => self.dead -= 1,
                _ => {}
            }
            *slot = value;
            return Ok(());
        }
        if value.is_nil() {
            return Ok(());
        }
        if self.dead > 8 && self.dead * 2 > self.entries.len() {
            self.compact();
        }
        self.index.insert(k, self.entries.len());
        self.entries.push((normalize(&key), value));
        Ok(())
    }

    pub fn set_str(&mut self, key: &str, value: Val) {
        // String keys are never nil or NaN
        let _ = self.set(Val::Str(Rc::from(key)), value);
    }

    pub fn set_int(&mut self, key: i64, value: Val) {
        let _ = self.set(Val::Int(key), value);
    }

    fn compact(&mut self) {
        self.entries.retain(|(_, v)| !v.is_nil());
        self.index.clear();
        for (i, (k, _)) in self.entries.iter().enumerate() {
            if let Some(key) = key_of(k) {
                self.index.insert(key, i);
            }
        }
        self.dead = 0;
    }

    /// Traversal step: the entry following `key`, or the first entry for nil.
    pub fn next(&self, key: &Val) -> Result<Option<(Val, Val)>> {
        let start = if key.is_nil() {
            0
        } else {
            match key_of(key).and_then(|k| self.index.get(&k)) {
                Some(&i) => i + 1,
                None => return Err(anyhow!("invalid key to 'next'")),
            }
        };
        Ok(self.entries[start.min(self.entries.len())..]
            .iter()
            .find(|(_, v)| !v.is_nil())
            .cloned())
    }

    /// Border of the sequence part: `n` such that `t[n]` is non-nil and `t[n+1]` is nil.
    pub fn len(&self) -> i64 {
        let mut n = 0;
        while !self.get_int(n + 1).is_nil() {
            n += 1;
        }
        n
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() == self.dead
    }

    /// Live entries in traversal order.
    pub fn iter(&self) -> impl Iterator<Item = (&Val, &Val)> {
        self.entries.iter().filter(|(_, v)| !v.is_nil()).map(|(k, v)| (k, v))
    }
}
