//! Identity keys and group matchers.
//!
//! Jobs and triggers are identified by a name scoped to a group, carried as
//! an explicit `Key<Kind>` shared by both job and trigger identities so the
//! two can never be mixed up at the type level.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Group used when the caller doesn't specify one.
pub const DEFAULT_GROUP: &str = "DEFAULT";

/// Marker for job identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobKind;

/// Marker for trigger identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TriggerKind;

/// A name scoped to a group, uniquely identifying a job or trigger within a
/// scheduler instance. Generic over a zero-sized `Kind` marker so
/// `Key<JobKind>` and `Key<TriggerKind>` are distinct types even though they
/// share an identical representation.
#[derive(Clone, Serialize, Deserialize)]
pub struct Key<Kind> {
    name: String,
    group: String,
    #[serde(skip)]
    _kind: PhantomData<Kind>,
}

/// Key identifying a job.
pub type JobKey = Key<JobKind>;

/// Key identifying a trigger.
pub type TriggerKey = Key<TriggerKind>;

impl<Kind> Key<Kind> {
    /// Construct a key in the default group.
    pub fn new(name: impl Into<String>) -> Self {
        Self::in_group(name, DEFAULT_GROUP)
    }

    /// Construct a key in an explicit group.
    pub fn in_group(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            _kind: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> &str {
        &self.group
    }
}

impl<Kind> fmt::Debug for Key<Kind> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

impl<Kind> fmt::Display for Key<Kind> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

impl<Kind> PartialEq for Key<Kind> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.group == other.group
    }
}

impl<Kind> Eq for Key<Kind> {}

impl<Kind> std::hash::Hash for Key<Kind> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.group.hash(state);
    }
}

impl<Kind> PartialOrd for Key<Kind> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<Kind> Ord for Key<Kind> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.group, &self.name).cmp(&(&other.group, &other.name))
    }
}

/// A predicate over some field of `T`, with boolean combinators. Used to
/// select subsets of jobs/triggers/groups without the caller needing direct
/// store access - pause-group, listener-matching, and bulk lookup all go
/// through this.
pub trait Matcher<T>: Send + Sync {
    fn is_match(&self, candidate: &T) -> bool;

    fn and<Other>(self, other: Other) -> And<Self, Other>
    where
        Self: Sized,
        Other: Matcher<T>,
    {
        And(self, other)
    }

    fn or<Other>(self, other: Other) -> Or<Self, Other>
    where
        Self: Sized,
        Other: Matcher<T>,
    {
        Or(self, other)
    }

    fn negate(self) -> Not<Self>
    where
        Self: Sized,
    {
        Not(self)
    }
}

pub struct And<A, B>(A, B);
pub struct Or<A, B>(A, B);
pub struct Not<A>(A);

impl<T, A: Matcher<T>, B: Matcher<T>> Matcher<T> for And<A, B> {
    fn is_match(&self, candidate: &T) -> bool {
        self.0.is_match(candidate) && self.1.is_match(candidate)
    }
}

impl<T, A: Matcher<T>, B: Matcher<T>> Matcher<T> for Or<A, B> {
    fn is_match(&self, candidate: &T) -> bool {
        self.0.is_match(candidate) || self.1.is_match(candidate)
    }
}

impl<T, A: Matcher<T>> Matcher<T> for Not<A> {
    fn is_match(&self, candidate: &T) -> bool {
        !self.0.is_match(candidate)
    }
}

/// String comparison operator used by `GroupMatcher`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StringOp {
    Equals,
    StartsWith,
    EndsWith,
    Contains,
}

/// Matches keys by group name.
pub struct GroupMatcher<Kind> {
    op: StringOp,
    value: String,
    _kind: PhantomData<Kind>,
}

impl<Kind> GroupMatcher<Kind> {
    pub fn group_equals(group: impl Into<String>) -> Self {
        Self::new(StringOp::Equals, group)
    }

    pub fn group_starts_with(prefix: impl Into<String>) -> Self {
        Self::new(StringOp::StartsWith, prefix)
    }

    pub fn group_ends_with(suffix: impl Into<String>) -> Self {
        Self::new(StringOp::EndsWith, suffix)
    }

    pub fn group_contains(needle: impl Into<String>) -> Self {
        Self::new(StringOp::Contains, needle)
    }

    /// Matches every key, regardless of group.
    pub fn any_group() -> Self {
        Self::new(StringOp::Contains, "")
    }

    fn new(op: StringOp, value: impl Into<String>) -> Self {
        Self {
            op,
            value: value.into(),
            _kind: PhantomData,
        }
    }
}

impl<Kind: Send + Sync> Matcher<Key<Kind>> for GroupMatcher<Kind> {
    fn is_match(&self, candidate: &Key<Kind>) -> bool {
        match self.op {
            StringOp::Equals => candidate.group() == self.value,
            StringOp::StartsWith => candidate.group().starts_with(&self.value),
            StringOp::EndsWith => candidate.group().ends_with(&self.value),
            StringOp::Contains => candidate.group().contains(&self.value),
        }
    }
}
