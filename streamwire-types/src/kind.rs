/// Connection role.
///
/// Mutable only through an explicit [`crate::Action::SwapKind`] action; everything else that
/// reads `Kind` does so from the value the transport passes into a handler callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Client,
    Server,
}

impl Kind {
    /// Flips client <-> server, as `swap_kind` requires.
    pub fn flipped(self) -> Self {
        match self {
            Kind::Client => Kind::Server,
            Kind::Server => Kind::Client,
        }
    }
}
