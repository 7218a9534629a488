//! Index-based doubly linked lists over an [`EntryPool`]
//!
//! An entry may sit on several lists at once; each list reaches its own
//! [`Links`] inside the entry through an accessor function.

use std::iter;

use crate::pool::{EntryPool, Handle};

/// Neighbour handles for one list membership
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Links {
    pub prev: Option<Handle>,
    pub next: Option<Handle>,
}

/// Head and tail of one list
#[derive(Debug, Default, Clone, Copy)]
pub struct List {
    head: Option<Handle>,
    tail: Option<Handle>,
    len: usize,
}

impl List {
    pub fn head(&self) -> Option<Handle> {
        self.head
    }

    pub fn tail(&self) -> Option<Handle> {
        self.tail
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push_back<T>(
        &mut self,
        pool: &mut EntryPool<T>,
        handle: Handle,
        links: fn(&mut T) -> &mut Links,
    ) {
        let tail = self.tail;
        *links(&mut pool[handle]) = Links {
            prev: tail,
            next: None,
        };
        match tail {
            Some(tail) => links(&mut pool[tail]).next = Some(handle),
            None => self.head = Some(handle),
        }
        self.tail = Some(handle);
        self.len += 1;
    }

    /// Link `handle` in front of `before`, or at the tail when `before` is `None`
    pub fn insert_before<T>(
        &mut self,
        pool: &mut EntryPool<T>,
        handle: Handle,
        before: Option<Handle>,
        links: fn(&mut T) -> &mut Links,
    ) {
        let Some(before) = before else {
            self.push_back(pool, handle, links);
            return;
        };

        let prev = links(&mut pool[before]).prev;
        *links(&mut pool[handle]) = Links {
            prev,
            next: Some(before),
        };
        links(&mut pool[before]).prev = Some(handle);
        match prev {
            Some(prev) => links(&mut pool[prev]).next = Some(handle),
            None => self.head = Some(handle),
        }
        self.len += 1;
    }

    pub fn unlink<T>(
        &mut self,
        pool: &mut EntryPool<T>,
        handle: Handle,
        links: fn(&mut T) -> &mut Links,
    ) {
        let Links { prev, next } = std::mem::take(links(&mut pool[handle]));
        match prev {
            Some(prev) => links(&mut pool[prev]).next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => links(&mut pool[next]).prev = prev,
            None => self.tail = prev,
        }
        self.len -= 1;
    }

    /// Move an already linked entry to the tail
    pub fn move_to_back<T>(
        &mut self,
        pool: &mut EntryPool<T>,
        handle: Handle,
        links: fn(&mut T) -> &mut Links,
    ) {
        if self.tail != Some(handle) {
            self.unlink(pool, handle, links);
            self.push_back(pool, handle, links);
        }
    }

    /// Walk the list from head to tail
    pub fn iter<'a, T>(
        &self,
        pool: &'a EntryPool<T>,
        links: fn(&T) -> &Links,
    ) -> impl Iterator<Item = Handle> + use<'a, T> {
        iter::successors(self.head, move |handle| links(&pool[*handle]).next)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
