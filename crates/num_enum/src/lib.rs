#![no_std]

/// Declares a field-less enum backed by an integer representation,
/// together with checked conversions from and to that integer.
///
/// ```
/// num_enum::num_enum! {
///     pub Color: u8 {
///         Red = 1,
///         Green = 2,
///     }
/// }
///
/// assert_eq!(Color::from_primitive(2), Some(Color::Green));
/// assert_eq!(u8::from(Color::Red), 1);
/// ```
#[macro_export]
macro_rules! num_enum {
    (
        $(#[$meta:meta])*
        $v:vis $name:ident: $repr:ident {
            $( $(#[$item_meta:meta])* $item_name:ident = $item_value:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr($repr)]
        #[derive(Eq, PartialEq, Debug, Copy, Clone, Ord, PartialOrd, Hash)]
        $v enum $name {
            $( $(#[$item_meta])* $item_name = $item_value ),+
        }

        impl $name {
            pub const fn from_primitive(item: $repr) -> ::core::option::Option<Self> {
                match item {
                    $($item_value => ::core::option::Option::Some($name::$item_name),)+
                    _ => ::core::option::Option::None,
                }
            }

            pub const fn to_primitive(self) -> $repr {
                self as $repr
            }
        }

        impl ::core::convert::From<$name> for $repr {
            fn from(item: $name) -> Self {
                item as $repr
            }
        }

        impl ::core::convert::TryFrom<$repr> for $name {
            /// The unrecognized value.
            type Error = $repr;

            fn try_from(item: $repr) -> ::core::result::Result<Self, $repr> {
                Self::from_primitive(item).ok_or(item)
            }
        }
    };
}

#[cfg(test)]
mod test {
    use core::convert::TryFrom;

    crate::num_enum! {
        Tag: u16 {
            One = 1,
            Two = 2,
        }
    }

    #[test]
    fn conversions() {
        assert_eq!(Tag::from_primitive(1), Some(Tag::One));
        assert_eq!(Tag::from_primitive(3), None);
        assert_eq!(Tag::Two.to_primitive(), 2);
        assert_eq!(u16::from(Tag::Two), 2);
        assert_eq!(Tag::try_from(2), Ok(Tag::Two));
        assert_eq!(Tag::try_from(0), Err(0));
    }
}
