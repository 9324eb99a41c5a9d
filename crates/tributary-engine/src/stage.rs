//! The three-method contract every pipeline stage implements.

use tributary_types::{StateMap, SubtaskName, Verb};

use crate::context::Context;

/// Lazy, finite sequence of `(item, next state)` pairs produced by a fetch.
///
/// Consumed one element at a time; not rewindable.
pub type Fetch<'a, T> = Box<dyn Iterator<Item = anyhow::Result<(T, StateMap)>> + 'a>;

/// A pipeline stage driven by the run-loop.
pub trait Stage {
    /// Unit of work yielded by [`Stage::fetch`] and consumed by [`Stage::process`].
    type Item;

    /// Pipeline role of this stage.
    fn verb(&self) -> Verb;

    /// Name keying the stage's run records.
    fn name(&self) -> SubtaskName;

    /// Produce the work sequence, starting from `state`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sequence cannot be started.
    fn fetch<'a>(&'a self, state: StateMap, ctx: &'a Context) -> anyhow::Result<Fetch<'a, Self::Item>>;

    /// Apply the side effect of one item.
    ///
    /// # Errors
    ///
    /// Returns an error if the item cannot be stored or transformed.
    fn process(&self, item: Self::Item, ctx: &Context) -> anyhow::Result<()>;

    /// Remove previously produced output for the context's scope. Called
    /// only before a full refresh.
    ///
    /// # Errors
    ///
    /// Returns an error if the output cannot be removed.
    fn delete(&self, ctx: &Context) -> anyhow::Result<()>;
}
