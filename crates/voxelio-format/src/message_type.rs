//! HDF5 object header message type identifiers.

macro_rules! message_types {
    ($($(#[$doc:meta])* $name:ident = $id:literal,)*) => {
        /// Header message types the reader distinguishes.
        ///
        /// Anything else is carried as `Unknown` and skipped by its declared size.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum MessageType {
            $($(#[$doc])* $name,)*
            Unknown(u16),
        }

        impl MessageType {
            pub fn from_u16(id: u16) -> MessageType {
                match id {
                    $($id => MessageType::$name,)*
                    other => MessageType::Unknown(other),
                }
            }

            pub fn to_u16(self) -> u16 {
                match self {
                    $(MessageType::$name => $id,)*
                    MessageType::Unknown(id) => id,
                }
            }
        }
    };
}

message_types! {
    Nil = 0x0000,
    Dataspace = 0x0001,
    LinkInfo = 0x0002,
    Datatype = 0x0003,
    /// Pre-1.8 fill value; never read.
    FillValueOld = 0x0004,
    FillValue = 0x0005,
    Link = 0x0006,
    DataLayout = 0x0008,
    GroupInfo = 0x000A,
    FilterPipeline = 0x000B,
    Attribute = 0x000C,
    ObjectHeaderContinuation = 0x0010,
    SymbolTable = 0x0011,
    ObjectModificationTime = 0x0012,
    AttributeInfo = 0x0015,
}
