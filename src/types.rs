//! Core types for the message bus.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier for a published message.
///
/// Ids are handed out in creation order, so sorting by id yields
/// publish order for messages created right before publishing.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Allocate the next id.
    pub fn next() -> Self {
        MessageId(NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a message type or contract.
///
/// Carries the declared direct supertypes so the full ancestry can be
/// walked without reflection. Equality and hashing use the `TypeId` only.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
    supertypes: fn() -> Vec<TypeKey>,
}

impl TypeKey {
    /// Key for `T`.
    pub fn of<T: ?Sized + MessageType>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            supertypes: <T as MessageType>::supertypes,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name (diagnostics only).
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Direct supertypes as declared by the type.
    pub fn supertypes(&self) -> Vec<TypeKey> {
        (self.supertypes)()
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A type that subscriptions can target.
///
/// Implemented by concrete messages and by contract markers (including
/// `dyn Trait` contracts). `supertypes` lists the *direct* parents only;
/// the bus computes the transitive closure.
///
/// ```ignore
/// #[derive(Debug)]
/// struct Login { user: String }
/// impl MessageType for Login {}
///
/// #[derive(Debug)]
/// struct AdminLogin { user: String }
/// impl MessageType for AdminLogin {
///     fn supertypes() -> Vec<TypeKey> {
///         vec![TypeKey::of::<Login>()]
///     }
/// }
/// ```
pub trait MessageType: 'static {
    fn supertypes() -> Vec<TypeKey> {
        Vec::new()
    }
}

/// Payload of a published message. Blanket-implemented for every sized
/// `MessageType` that is `Send + Sync + Debug`.
pub trait Message: Any + Send + Sync + fmt::Debug {
    /// Concrete type of this payload.
    fn type_key(&self) -> TypeKey;

    fn as_any(&self) -> &dyn Any;
}

impl<T> Message for T
where
    T: MessageType + Any + Send + Sync + fmt::Debug,
{
    fn type_key(&self) -> TypeKey {
        TypeKey::of::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A published message: unique id, payload, and the historic flag.
///
/// Two envelopes are equal iff they carry the same id. A replay hands the
/// subscriber a historic view sharing id and payload with the retained
/// envelope; the retained envelope itself never changes.
pub struct Envelope {
    id: MessageId,
    type_key: TypeKey,
    payload: Arc<dyn Message>,
    historic: bool,
}

impl Envelope {
    /// Wrap a payload with a fresh id.
    pub fn new<M: Message>(payload: M) -> Self {
        Self {
            id: MessageId::next(),
            type_key: payload.type_key(),
            payload: Arc::new(payload),
            historic: false,
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Concrete type of the payload.
    pub fn type_key(&self) -> TypeKey {
        self.type_key
    }

    pub fn payload(&self) -> &dyn Message {
        &*self.payload
    }

    /// Borrow the payload as its concrete type.
    pub fn downcast_ref<T: Message>(&self) -> Option<&T> {
        self.payload.as_any().downcast_ref::<T>()
    }

    /// True if the payload's concrete type is `T`.
    pub fn is<T: Message>(&self) -> bool {
        self.payload.as_any().is::<T>()
    }

    /// True if this is a replayed copy delivered to a late subscriber.
    pub fn is_historic(&self) -> bool {
        self.historic
    }

    /// Same message with the historic flag set to `historic`.
    pub(crate) fn with_historic(&self, historic: bool) -> Arc<Envelope> {
        Arc::new(Envelope {
            id: self.id,
            type_key: self.type_key,
            payload: Arc::clone(&self.payload),
            historic,
        })
    }
}

impl PartialEq for Envelope {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Envelope {}

impl Hash for Envelope {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("id", &self.id)
            .field("type", &self.type_key)
            .field("historic", &self.historic)
            .field("payload", &self.payload)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Ping(u32);
    impl MessageType for Ping {}

    trait Auditable {}
    impl MessageType for dyn Auditable {}

    #[derive(Debug)]
    struct Audited;
    impl MessageType for Audited {
        fn supertypes() -> Vec<TypeKey> {
            vec![TypeKey::of::<dyn Auditable>()]
        }
    }

    #[test]
    fn test_message_ids_increase() {
        let a = MessageId::next();
        let b = MessageId::next();
        assert!(b > a);
    }

    #[test]
    fn test_envelope_identity_by_id() {
        let a = Envelope::new(Ping(1));
        let b = Envelope::new(Ping(1));
        assert_ne!(a, b);
        assert_eq!(a, a);
    }

    #[test]
    fn test_envelope_downcast() {
        let envelope = Envelope::new(Ping(7));
        assert_eq!(envelope.downcast_ref::<Ping>(), Some(&Ping(7)));
        assert!(envelope.downcast_ref::<Audited>().is_none());
        assert!(envelope.is::<Ping>());
        assert_eq!(envelope.type_key(), TypeKey::of::<Ping>());
    }

    #[test]
    fn test_historic_view_leaves_original_untouched() {
        let envelope = Envelope::new(Ping(1));
        assert!(!envelope.is_historic());

        let view = envelope.with_historic(true);
        assert!(view.is_historic());
        assert!(!envelope.is_historic());
        assert_eq!(*view, envelope);
        assert_eq!(view.downcast_ref::<Ping>(), Some(&Ping(1)));
    }

    #[test]
    fn test_type_key_supertypes() {
        let key = TypeKey::of::<Audited>();
        assert_eq!(key.supertypes(), vec![TypeKey::of::<dyn Auditable>()]);
        assert!(TypeKey::of::<Ping>().supertypes().is_empty());
        assert!(key.name().ends_with("Audited"));
    }
}
