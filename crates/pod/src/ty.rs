use core::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Type(u32);

macro_rules! declare {
    (impl Type {
        $(
            #[name = $name:literal]
            $vis:vis const $ident:ident = $value:expr;
        )*
    }) => {
        impl Type {
            $(
                #[doc = concat!(" The `", $name, "` type.")]
                $vis const $ident: Self = Self($value);
            )*
        }

        impl fmt::Display for Type {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match *self {
                    $(Self::$ident => write!(f, $name),)*
                    _ => write!(f, "Unknown({})", self.0),
                }
            }
        }
    };
}

declare! {
    impl Type {
        #[name = "None"]
        pub const NONE = 1;
        #[name = "Bool"]
        pub const BOOL = 2;
        #[name = "Id"]
        pub const ID = 3;
        #[name = "Int"]
        pub const INT = 4;
        #[name = "Long"]
        pub const LONG = 5;
        #[name = "Float"]
        pub const FLOAT = 6;
        #[name = "Double"]
        pub const DOUBLE = 7;
        #[name = "String"]
        pub const STRING = 8;
        #[name = "Bytes"]
        pub const BYTES = 9;
        #[name = "Rectangle"]
        pub const RECTANGLE = 10;
        #[name = "Fraction"]
        pub const FRACTION = 11;
        #[name = "Array"]
        pub const ARRAY = 13;
        #[name = "Struct"]
        pub const STRUCT = 14;
        #[name = "Object"]
        pub const OBJECT = 15;
        #[name = "Choice"]
        pub const CHOICE = 19;
    }
}

impl Type {
    /// Construct a new type from its raw tag.
    #[inline]
    pub const fn new(ty: u32) -> Self {
        Self(ty)
    }

    /// Convert the type to a `u32`.
    #[inline]
    pub const fn into_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Type {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
