//! Declares a string-coded wire enum together with its code, display label
//! and `FromStr` lookup.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident = $wire:literal => $label:literal,)+
        }
        $(fallback $fallback:ident)?
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ::serde::Serialize, ::serde::Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $wire)]
                $variant,
            )+
            $(
                #[serde(other)]
                $fallback,
            )?
        }

        impl $name {
            /// Every value that can be sent to the server.
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            /// Code used on the wire and in query strings.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                    $($name::$fallback => "unknown",)?
                }
            }

            /// Human readable label.
            #[must_use]
            pub const fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                    $($name::$fallback => "Unknown",)?
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let value = value.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|candidate| candidate.as_str().eq_ignore_ascii_case(value))
                    .ok_or_else(|| $crate::UnknownVariant {
                        kind: stringify!($name),
                        value: value.to_string(),
                    })
            }
        }
    };
}
