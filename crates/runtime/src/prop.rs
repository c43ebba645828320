use pod::Value;

/// The key of a property.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct Prop(str);

impl Prop {
    /// Create a new property key.
    pub(crate) const fn new(name: &str) -> &Self {
        // SAFETY: A property key is repr transparent over a `str`.
        unsafe { &*(name as *const str as *const Prop) }
    }

    /// Access the key as a string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<Prop> for Prop {
    #[inline]
    fn as_ref(&self) -> &Prop {
        self
    }
}

impl AsRef<Prop> for str {
    #[inline]
    fn as_ref(&self) -> &Prop {
        Prop::new(self)
    }
}

impl AsRef<Prop> for String {
    #[inline]
    fn as_ref(&self) -> &Prop {
        Prop::new(self.as_str())
    }
}

impl From<&Prop> for Value {
    #[inline]
    fn from(prop: &Prop) -> Self {
        Value::String(String::from(prop.as_str()))
    }
}

macro_rules! properties {
    ($(
        $(#[$($meta:meta)*])*
        $name:ident = $value:literal;
    )*) => {
        $(
            $(#[$($meta)*])*
            #[doc = concat!(" The `", $value, "` property key.")]
            pub const $name: &Prop = Prop::new($value);
        )*

        impl Prop {
            /// Lookup a well-known property key.
            pub fn get(name: &str) -> Option<&'static Self> {
                $(
                    if name == $value {
                        return Some($name);
                    }
                )*

                None
            }
        }
    };
}

properties! {
    APPLICATION_NAME = "application.name";
    NODE_NAME = "node.name";
    NODE_DESCRIPTION = "node.description";
    NODE_DRIVER = "node.driver";
    NODE_TRIGGER = "node.trigger";
    NODE_PAUSE_ON_IDLE = "node.pause-on-idle";
    NODE_SUSPEND_ON_IDLE = "node.suspend-on-idle";
    NODE_LATENCY = "node.latency";
    NODE_MAX_LATENCY = "node.max-latency";
    NODE_RATE = "node.rate";
    NODE_FORCE_QUANTUM = "node.force-quantum";
    NODE_FORCE_RATE = "node.force-rate";
    NODE_LOCK_QUANTUM = "node.lock-quantum";
    NODE_LOCK_RATE = "node.lock-rate";
    NODE_GROUP = "node.group";
    NODE_LINK_GROUP = "node.link-group";
    NODE_WANT_DRIVER = "node.want-driver";
    NODE_ALWAYS_PROCESS = "node.always-process";
    NODE_PASSIVE = "node.passive";
    NODE_TRANSPORT_SYNC = "node.transport.sync";
    MEDIA_CLASS = "media.class";
    MEDIA_TYPE = "media.type";
    STREAM_IS_LIVE = "stream.is-live";
    MEM_ALLOW_MLOCK = "mem.allow-mlock";
    MEM_WARN_MLOCK = "mem.warn-mlock";
    PRIORITY_DRIVER = "priority.driver";
}
