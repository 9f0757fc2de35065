/// Flow-control setting for a transport instance.
///
/// `Once` arms exactly one dispatch and then reverts to `False`; the revert happens before the
/// handler's return actions for that dispatch are applied, so a handler may reinstate `Once` or
/// `True` from within the same callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveMode {
    Once,
    True,
    False,
}

impl ActiveMode {
    pub fn is_active(self) -> bool {
        !matches!(self, ActiveMode::False)
    }
}

impl Default for ActiveMode {
    fn default() -> Self {
        ActiveMode::False
    }
}
