use crate::identity::ActorRef;

/// Resolves who is acting for the current operation.
///
/// Returning `None` records an anonymous or system change.
pub trait ActorResolver: Send + Sync {
    fn current_actor(&self) -> Option<ActorRef>;
}

/// Resolver for background jobs and migrations: always anonymous.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemActor;

impl ActorResolver for SystemActor {
    fn current_actor(&self) -> Option<ActorRef> {
        None
    }
}

/// Resolver that always reports the same actor.
#[derive(Clone, Debug)]
pub struct FixedActor(pub ActorRef);

impl ActorResolver for FixedActor {
    fn current_actor(&self) -> Option<ActorRef> {
        Some(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_actor_is_anonymous() {
        assert!(SystemActor.current_actor().is_none());
    }

    #[test]
    fn fixed_actor_reports_actor() {
        let resolver = FixedActor(ActorRef::user("alice"));
        assert_eq!(resolver.current_actor(), Some(ActorRef::user("alice")));
    }
}
