/// Outcome of verifying an item against live state.
///
/// Memoized per item for the lifetime of a query session (until the next load
/// or [`Generation::reset_query_state`](crate::Generation::reset_query_state));
/// never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ItemState {
    /// Not verified in this session.
    #[default]
    Unverified,
    UpToDate,
    OutOfDate,
}

impl ItemState {
    pub fn is_verified(self) -> bool {
        self != ItemState::Unverified
    }
}
