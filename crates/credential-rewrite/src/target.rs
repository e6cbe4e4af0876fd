/// A Stratum method whose identity field is eligible for rewriting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RewriteTarget {
    /// `mining.authorize` -- `[identity, password]`.
    Authorize,
    /// `mining.submit` -- `[identity, job_id, extranonce2, ntime, nonce, ...]`.
    Submit,
    /// `mining.subscribe` -- `[user_agent, ...]`.
    Subscribe,
}

impl RewriteTarget {
    /// Every rewrite target, in no particular order.
    pub const ALL: [RewriteTarget; 3] = [
        RewriteTarget::Authorize,
        RewriteTarget::Submit,
        RewriteTarget::Subscribe,
    ];

    /// Look up a target by exact method name.
    pub fn from_method(method: &str) -> Option<Self> {
        match method {
            "mining.authorize" => Some(RewriteTarget::Authorize),
            "mining.submit" => Some(RewriteTarget::Submit),
            "mining.subscribe" => Some(RewriteTarget::Subscribe),
            _ => None,
        }
    }

    /// The wire method name.
    pub fn method(self) -> &'static str {
        match self {
            RewriteTarget::Authorize => "mining.authorize",
            RewriteTarget::Submit => "mining.submit",
            RewriteTarget::Subscribe => "mining.subscribe",
        }
    }

    /// Whether `params[1]` carries a password that must be replaced too.
    pub fn carries_password(self) -> bool {
        matches!(self, RewriteTarget::Authorize)
    }

    /// Whether a rewrite of this method should be logged.
    ///
    /// Share submissions arrive far more often than anything else, so they
    /// are rewritten silently.
    pub fn is_logged(self) -> bool {
        !matches!(self, RewriteTarget::Submit)
    }
}

impl std::fmt::Display for RewriteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.method())
    }
}
