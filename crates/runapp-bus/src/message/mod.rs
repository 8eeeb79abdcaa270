//! Bus messages and their typed body cursor.
//!
//! A [`Message`] is either under construction or received. Messages under
//! construction accept [`Message::append`] and container calls until they
//! are sealed for sending; received messages accept [`Message::read`] and
//! the same container calls to walk their body. Container calls keep a
//! stack of open scopes so every value is checked against the slot its
//! enclosing container declares.

mod marshal;
pub(crate) mod names;
mod signature;
mod value;
mod wire;

use std::fmt;

use crate::error::{DecodingError, EncodingError, MessageError, StructuralError};

use marshal::{ArrayMark, Endian, Reader, Writer};
use wire::{DecodedFrame, FrameParts, HeaderFields};

pub use signature::{
    ContainerKind, MAX_ARRAY_DEPTH, MAX_SIGNATURE_LEN, MAX_STRUCT_DEPTH, ObjectPath,
    ObjectPathError, Signature, SignatureError, Type,
};
pub use value::{Array, Value};
pub use wire::{MAX_MESSAGE_LEN, frame_length};

/// Header flag asking the recipient not to send a reply.
pub const NO_REPLY_EXPECTED: u8 = 0x1;
/// Header flag asking the bus not to launch the destination service.
pub const NO_AUTO_START: u8 = 0x2;

/// Serial the engine stamps on messages it synthesises locally.
pub(crate) const LOCAL_SERIAL: u32 = u32::MAX;

/// Kind of a bus message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Request to invoke a method.
    MethodCall,
    /// Successful reply to a method call.
    MethodReturn,
    /// Failure reply to a method call.
    Error,
    /// Broadcast notification.
    Signal,
}

impl MessageKind {
    const fn code(self) -> u8 {
        match self {
            Self::MethodCall => 1,
            Self::MethodReturn => 2,
            Self::Error => 3,
            Self::Signal => 4,
        }
    }

    const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::MethodCall),
            2 => Some(Self::MethodReturn),
            3 => Some(Self::Error),
            4 => Some(Self::Signal),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::MethodCall => "method call",
            Self::MethodReturn => "method return",
            Self::Error => "error",
            Self::Signal => "signal",
        };
        formatter.write_str(label)
    }
}

/// A bus message with its typed body cursor.
#[derive(Debug, Clone)]
pub struct Message {
    kind: MessageKind,
    flags: u8,
    serial: u32,
    fields: HeaderFields,
    signature: String,
    body: Vec<u8>,
    endian: Endian,
    mode: Mode,
}

#[derive(Debug, Clone)]
enum Mode {
    Build(BuildState),
    Read(ReadState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildStatus {
    Open,
    Sealed,
    Poisoned,
}

#[derive(Debug, Clone)]
struct BuildState {
    status: BuildStatus,
    scopes: Vec<WriteScope>,
}

#[derive(Debug, Clone)]
struct WriteScope {
    kind: ContainerKind,
    contents: Vec<Type>,
    next: usize,
    array: Option<ArrayMark>,
}

impl WriteScope {
    fn claim(&mut self, ty: &Type) -> Result<(), EncodingError> {
        let slot = match self.kind {
            ContainerKind::Array => self.contents.first(),
            _ => self.contents.get(self.next),
        };
        let Some(expected) = slot else {
            return Err(EncodingError::ContainerFull { kind: self.kind });
        };
        if expected != ty {
            return Err(EncodingError::UnexpectedType {
                expected: expected.to_string(),
                found: ty.to_string(),
            });
        }
        if self.kind != ContainerKind::Array {
            self.next += 1;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct ReadState {
    pos: usize,
    root: Vec<Type>,
    root_next: usize,
    scopes: Vec<ReadScope>,
}

#[derive(Debug, Clone)]
struct ReadScope {
    kind: ContainerKind,
    contents: Vec<Type>,
    next: usize,
    end: usize,
}

impl ReadState {
    fn new(root: Vec<Type>) -> Self {
        Self {
            pos: 0,
            root,
            root_next: 0,
            scopes: Vec::new(),
        }
    }

    fn expected(&self) -> Option<&Type> {
        match self.scopes.last() {
            None => self.root.get(self.root_next),
            Some(scope) if scope.kind == ContainerKind::Array => {
                if self.pos < scope.end {
                    scope.contents.first()
                } else {
                    None
                }
            }
            Some(scope) => scope.contents.get(scope.next),
        }
    }

    fn advance(&mut self) {
        match self.scopes.last_mut() {
            None => self.root_next += 1,
            Some(scope) if scope.kind == ContainerKind::Array => {}
            Some(scope) => scope.next += 1,
        }
    }

    fn at_end(&self) -> bool {
        self.expected().is_none()
    }
}

impl Message {
    fn build(kind: MessageKind, fields: HeaderFields) -> Self {
        Self {
            kind,
            flags: 0,
            serial: 0,
            fields,
            signature: String::new(),
            body: Vec::new(),
            endian: Endian::Little,
            mode: Mode::Build(BuildState {
                status: BuildStatus::Open,
                scopes: Vec::new(),
            }),
        }
    }

    /// Creates a method call.
    ///
    /// `destination` and `interface` may be omitted for peer-to-peer calls
    /// and for methods whose name is unambiguous on the object.
    ///
    /// # Errors
    ///
    /// Returns a [`MessageError`] when any name or the path is invalid.
    pub fn method_call(
        destination: Option<&str>,
        path: &str,
        interface: Option<&str>,
        member: &str,
    ) -> Result<Self, MessageError> {
        let fields = HeaderFields {
            path: Some(ObjectPath::new(path).map_err(EncodingError::from)?),
            interface: interface.map(names::interface).transpose()?,
            member: Some(names::member(member)?),
            destination: destination.map(names::bus_name).transpose()?,
            ..HeaderFields::default()
        };
        Ok(Self::build(MessageKind::MethodCall, fields))
    }

    /// Creates a signal emitted from `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`MessageError`] when any name or the path is invalid.
    pub fn signal(path: &str, interface: &str, member: &str) -> Result<Self, MessageError> {
        let fields = HeaderFields {
            path: Some(ObjectPath::new(path).map_err(EncodingError::from)?),
            interface: Some(names::interface(interface)?),
            member: Some(names::member(member)?),
            ..HeaderFields::default()
        };
        Ok(Self::build(MessageKind::Signal, fields))
    }

    /// Creates the successful reply to `call`.
    #[must_use]
    pub fn method_return(call: &Self) -> Self {
        Self::build(MessageKind::MethodReturn, reply_fields(call))
    }

    /// Creates an error reply to `call` carrying `text` as its body.
    ///
    /// # Errors
    ///
    /// Returns a [`MessageError`] when `name` is not a valid error name or
    /// `text` contains a NUL byte.
    pub fn error_reply(call: &Self, name: &str, text: &str) -> Result<Self, MessageError> {
        let fields = HeaderFields {
            error_name: Some(names::interface(name).map_err(|_| {
                EncodingError::InvalidName {
                    kind: "error name",
                    value: name.to_owned(),
                }
            })?),
            ..reply_fields(call)
        };
        let mut reply = Self::build(MessageKind::Error, fields);
        reply.append("s", &[Value::from(text)])?;
        Ok(reply)
    }

    /// Synthesises the local `Disconnected` signal delivered when the peer
    /// goes away.
    pub(crate) fn local_disconnected() -> Result<Self, MessageError> {
        let mut signal = Self::signal(
            crate::LOCAL_PATH,
            crate::LOCAL_INTERFACE,
            crate::DISCONNECTED_MEMBER,
        )?;
        signal.set_sender(crate::LOCAL_INTERFACE)?;
        signal.into_received(LOCAL_SERIAL)
    }

    /// Parses a complete frame received from the bus.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodingError`] when the bytes are not a valid message.
    pub fn from_bytes(frame: &[u8]) -> Result<Self, DecodingError> {
        let DecodedFrame {
            endian,
            kind,
            flags,
            serial,
            fields,
            signature,
            body,
        } = wire::decode(frame)?;
        let root = Type::parse_many(&signature)?;
        Ok(Self {
            kind,
            flags,
            serial,
            fields,
            signature,
            body,
            endian,
            mode: Mode::Read(ReadState::new(root)),
        })
    }

    /// Seals the message and serializes it with `serial`.
    pub(crate) fn encode(&mut self, serial: u32) -> Result<Vec<u8>, MessageError> {
        self.seal()?;
        self.serial = serial;
        let frame = wire::encode(&FrameParts {
            kind: self.kind,
            flags: self.flags,
            serial,
            fields: &self.fields,
            signature: &self.signature,
            body: &self.body,
        })?;
        Ok(frame)
    }

    /// Seals a locally built message and reopens it as if it had been
    /// received, so its body can be read.
    ///
    /// # Errors
    ///
    /// Returns a [`MessageError`] when the message cannot be sealed.
    pub fn into_received(mut self, serial: u32) -> Result<Self, MessageError> {
        let frame = self.encode(serial)?;
        Ok(Self::from_bytes(&frame)?)
    }

    /// Returns the message kind.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Returns the serial, or zero for a message that was never sent.
    #[must_use]
    pub const fn serial(&self) -> u32 {
        self.serial
    }

    /// Returns the header flags.
    #[must_use]
    pub const fn flags(&self) -> u8 {
        self.flags
    }

    /// Returns `true` when the message is a method call whose sender waits
    /// for a reply.
    #[must_use]
    pub const fn expects_reply(&self) -> bool {
        matches!(self.kind, MessageKind::MethodCall) && self.flags & NO_REPLY_EXPECTED == 0
    }

    /// Returns the object path.
    #[must_use]
    pub const fn path(&self) -> Option<&ObjectPath> {
        self.fields.path.as_ref()
    }

    /// Returns the interface name.
    #[must_use]
    pub fn interface(&self) -> Option<&str> {
        self.fields.interface.as_deref()
    }

    /// Returns the member name.
    #[must_use]
    pub fn member(&self) -> Option<&str> {
        self.fields.member.as_deref()
    }

    /// Returns the error name of an error reply.
    #[must_use]
    pub fn error_name(&self) -> Option<&str> {
        self.fields.error_name.as_deref()
    }

    /// Returns the serial of the call this message replies to.
    #[must_use]
    pub const fn reply_serial(&self) -> Option<u32> {
        self.fields.reply_serial
    }

    /// Returns the destination bus name.
    #[must_use]
    pub fn destination(&self) -> Option<&str> {
        self.fields.destination.as_deref()
    }

    /// Returns the sender bus name.
    #[must_use]
    pub fn sender(&self) -> Option<&str> {
        self.fields.sender.as_deref()
    }

    /// Returns the body signature.
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Returns `true` once the message has been received or sealed.
    #[must_use]
    pub const fn is_sealed(&self) -> bool {
        match &self.mode {
            Mode::Read(_) => true,
            Mode::Build(state) => matches!(state.status, BuildStatus::Sealed),
        }
    }

    /// Sets or clears [`NO_REPLY_EXPECTED`].
    ///
    /// # Errors
    ///
    /// Returns a [`MessageError`] when the message is no longer writable.
    pub fn set_no_reply_expected(&mut self, no_reply: bool) -> Result<(), MessageError> {
        self.build_state()?;
        if no_reply {
            self.flags |= NO_REPLY_EXPECTED;
        } else {
            self.flags &= !NO_REPLY_EXPECTED;
        }
        Ok(())
    }

    /// Sets the sender field, as a bus or peer would.
    ///
    /// # Errors
    ///
    /// Returns a [`MessageError`] when the name is invalid or the message is
    /// no longer writable.
    pub fn set_sender(&mut self, sender: &str) -> Result<(), MessageError> {
        self.build_state()?;
        self.fields.sender = Some(names::bus_name(sender)?);
        Ok(())
    }

    /// Sets the destination field.
    ///
    /// # Errors
    ///
    /// Returns a [`MessageError`] when the name is invalid or the message is
    /// no longer writable.
    pub fn set_destination(&mut self, destination: &str) -> Result<(), MessageError> {
        self.build_state()?;
        self.fields.destination = Some(names::bus_name(destination)?);
        Ok(())
    }

    fn build_state(&self) -> Result<&BuildState, EncodingError> {
        match &self.mode {
            Mode::Read(_) => Err(EncodingError::ReadOnly),
            Mode::Build(state) => match state.status {
                BuildStatus::Open => Ok(state),
                BuildStatus::Sealed => Err(EncodingError::Sealed),
                BuildStatus::Poisoned => Err(EncodingError::Poisoned),
            },
        }
    }

    fn poison_on_error<T>(&mut self, result: Result<T, MessageError>) -> Result<T, MessageError> {
        if result.is_err()
            && let Mode::Build(state) = &mut self.mode
            && state.status == BuildStatus::Open
        {
            state.status = BuildStatus::Poisoned;
        }
        result
    }

    /// Appends `values`, whose types are listed by `signature`, at the
    /// current cursor position.
    ///
    /// Each value must have exactly the type its signature slot names and,
    /// inside an open container, the type the container expects next. A
    /// failed append poisons the message: it can no longer be appended to
    /// or sent.
    ///
    /// # Errors
    ///
    /// Returns a [`MessageError`] on type mismatch, arity mismatch, invalid
    /// signature or string data, or when the message is not writable.
    pub fn append(&mut self, signature: &str, values: &[Value]) -> Result<(), MessageError> {
        let result = self.try_append(signature, values);
        self.poison_on_error(result)
    }

    fn try_append(&mut self, signature: &str, values: &[Value]) -> Result<(), MessageError> {
        self.build_state()?;
        let types = Type::parse_fragment(signature).map_err(EncodingError::from)?;
        if types.len() != values.len() {
            return Err(EncodingError::ArityMismatch {
                signature: signature.to_owned(),
                expected: types.len(),
                found: values.len(),
            }
            .into());
        }
        for (ty, value) in types.iter().zip(values) {
            if !value.conforms_to(ty) {
                return Err(EncodingError::TypeMismatch {
                    expected: ty.to_string(),
                    found: value.value_type().to_string(),
                }
                .into());
            }
            self.claim_slot(ty)?;
            Writer::new(&mut self.body).put_value(value)?;
        }
        Ok(())
    }

    fn claim_slot(&mut self, ty: &Type) -> Result<(), EncodingError> {
        let Mode::Build(state) = &mut self.mode else {
            return Err(EncodingError::ReadOnly);
        };
        if let Some(scope) = state.scopes.last_mut() {
            return scope.claim(ty);
        }
        if ty.is_dict_entry() {
            return Err(SignatureError::DictEntryOutsideArray.into());
        }
        let mut extended = self.signature.clone();
        ty.write_signature(&mut extended);
        if extended.len() > MAX_SIGNATURE_LEN {
            return Err(SignatureError::TooLong(extended.len()).into());
        }
        self.signature = extended;
        Ok(())
    }

    /// Opens a container at the cursor.
    ///
    /// `contents` is the signature of what the container holds: the element
    /// type of an array, the fields of a struct, the key and value of a dict
    /// entry, or the single type boxed in a variant. On a received message
    /// this enters the next value instead, which must have that shape.
    ///
    /// # Errors
    ///
    /// Returns a [`MessageError`] when the container does not fit the slot
    /// at the cursor or `contents` is invalid for `kind`.
    pub fn open_container(
        &mut self,
        kind: ContainerKind,
        contents: &str,
    ) -> Result<(), MessageError> {
        if matches!(self.mode, Mode::Read(_)) {
            return self.enter_container(kind, contents);
        }
        let result = self.begin_container(kind, contents);
        self.poison_on_error(result)
    }

    /// Closes the innermost open container.
    ///
    /// On a received message any unread contents of the container are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StructuralError::NoOpenContainer`] when nothing is open, and
    /// [`StructuralError::IncompleteContainer`] when a struct, dict entry or
    /// variant under construction is missing values.
    pub fn close_container(&mut self) -> Result<(), MessageError> {
        if matches!(self.mode, Mode::Read(_)) {
            return self.exit_container();
        }
        let result = self.end_container();
        self.poison_on_error(result)
    }

    fn begin_container(&mut self, kind: ContainerKind, contents: &str) -> Result<(), MessageError> {
        self.build_state()?;
        let inner = Type::parse_fragment(contents).map_err(EncodingError::from)?;
        let container = kind
            .container_type(&inner)
            .map_err(EncodingError::from)?;
        self.claim_slot(&container)?;
        let mut writer = Writer::new(&mut self.body);
        let array = match kind {
            ContainerKind::Array => inner.first().map(|element| writer.begin_array(element)),
            ContainerKind::Struct | ContainerKind::DictEntry => {
                writer.pad(8);
                None
            }
            ContainerKind::Variant => {
                writer.put_signature(contents)?;
                None
            }
        };
        if let Mode::Build(state) = &mut self.mode {
            state.scopes.push(WriteScope {
                kind,
                contents: inner,
                next: 0,
                array,
            });
        }
        Ok(())
    }

    fn end_container(&mut self) -> Result<(), MessageError> {
        self.build_state()?;
        let Mode::Build(state) = &mut self.mode else {
            return Err(EncodingError::ReadOnly.into());
        };
        let Some(scope) = state.scopes.pop() else {
            return Err(StructuralError::NoOpenContainer.into());
        };
        if scope.kind != ContainerKind::Array && scope.next < scope.contents.len() {
            return Err(StructuralError::IncompleteContainer {
                kind: scope.kind,
                expected: Signature::from_types(&scope.contents).to_string(),
            }
            .into());
        }
        if let Some(mark) = scope.array {
            Writer::new(&mut self.body).finish_array(mark)?;
        }
        Ok(())
    }

    /// Finishes construction; no further appends are accepted.
    ///
    /// Sealing an already sealed message succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StructuralError::UnclosedContainers`] when containers are
    /// still open, and an [`EncodingError`] when the message was poisoned
    /// or was received rather than built.
    pub fn seal(&mut self) -> Result<(), MessageError> {
        let Mode::Build(state) = &mut self.mode else {
            return Err(EncodingError::ReadOnly.into());
        };
        match state.status {
            BuildStatus::Sealed => Ok(()),
            BuildStatus::Poisoned => Err(EncodingError::Poisoned.into()),
            BuildStatus::Open if !state.scopes.is_empty() => {
                Err(StructuralError::UnclosedContainers {
                    depth: state.scopes.len(),
                }
                .into())
            }
            BuildStatus::Open => {
                state.status = BuildStatus::Sealed;
                Ok(())
            }
        }
    }

    /// Reads the values listed by `signature` from the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`DecodingError::EndOfData`] when the current container or
    /// body is exhausted, [`DecodingError::TypeMismatch`] when the next value
    /// has a different type, and other decoding errors for corrupt data.
    pub fn read(&mut self, signature: &str) -> Result<Vec<Value>, MessageError> {
        let types = Type::parse_fragment(signature).map_err(DecodingError::from)?;
        let mut values = Vec::with_capacity(types.len());
        for ty in &types {
            values.push(self.read_one(ty)?);
        }
        Ok(values)
    }

    /// Reads exactly `N` values, for destructuring at the call site.
    ///
    /// # Errors
    ///
    /// Returns [`DecodingError::ArityMismatch`] when `signature` does not
    /// list `N` types, plus every error [`Message::read`] can return.
    pub fn read_fixed<const N: usize>(
        &mut self,
        signature: &str,
    ) -> Result<[Value; N], MessageError> {
        let types = Type::parse_fragment(signature).map_err(DecodingError::from)?;
        if types.len() != N {
            return Err(DecodingError::ArityMismatch {
                signature: signature.to_owned(),
                expected: N,
                found: types.len(),
            }
            .into());
        }
        let values = self.read(signature)?;
        <[Value; N]>::try_from(values).map_err(|values| {
            DecodingError::ArityMismatch {
                signature: signature.to_owned(),
                expected: N,
                found: values.len(),
            }
            .into()
        })
    }

    /// Reads one value of a single complete type and converts it.
    ///
    /// # Errors
    ///
    /// Returns every error [`Message::read`] can return, plus a type
    /// mismatch when the value does not convert into `T`.
    pub fn read_value<T>(&mut self, signature: &str) -> Result<T, MessageError>
    where
        T: TryFrom<Value, Error = DecodingError>,
    {
        let parsed = Type::parse_fragment(signature).map_err(DecodingError::from)?;
        let [ty] = <[Type; 1]>::try_from(parsed).map_err(|types| DecodingError::ArityMismatch {
            signature: signature.to_owned(),
            expected: 1,
            found: types.len(),
        })?;
        let value = self.read_one(&ty)?;
        Ok(T::try_from(value)?)
    }

    const fn read_state(&mut self) -> Result<&mut ReadState, DecodingError> {
        match &mut self.mode {
            Mode::Read(state) => Ok(state),
            Mode::Build(_) => Err(DecodingError::WriteOnly),
        }
    }

    fn read_one(&mut self, ty: &Type) -> Result<Value, DecodingError> {
        let endian = self.endian;
        let Mode::Read(state) = &mut self.mode else {
            return Err(DecodingError::WriteOnly);
        };
        let expected = state.expected().cloned().ok_or_else(|| DecodingError::EndOfData {
            expected: ty.to_string(),
        })?;
        if expected != *ty {
            return Err(DecodingError::TypeMismatch {
                expected: ty.to_string(),
                found: expected.to_string(),
            });
        }
        let mut reader = Reader::new(&self.body, state.pos, endian);
        let value = reader.get_value(ty)?;
        state.pos = reader.position();
        state.advance();
        Ok(value)
    }

    fn enter_container(&mut self, kind: ContainerKind, contents: &str) -> Result<(), MessageError> {
        let endian = self.endian;
        let inner = Type::parse_fragment(contents).map_err(DecodingError::from)?;
        let container = kind.container_type(&inner).map_err(DecodingError::from)?;
        let Mode::Read(state) = &mut self.mode else {
            return Err(DecodingError::WriteOnly.into());
        };
        let expected = state.expected().cloned().ok_or_else(|| DecodingError::EndOfData {
            expected: container.to_string(),
        })?;
        if expected != container {
            return Err(DecodingError::TypeMismatch {
                expected: container.to_string(),
                found: expected.to_string(),
            }
            .into());
        }
        let mut reader = Reader::new(&self.body, state.pos, endian);
        let mut end = 0;
        match kind {
            ContainerKind::Array => {
                if let Some(element) = inner.first() {
                    end = reader.begin_array(element)?;
                }
            }
            ContainerKind::Struct | ContainerKind::DictEntry => reader.align(8)?,
            ContainerKind::Variant => {
                let found = reader.get_signature()?;
                if found != contents {
                    return Err(DecodingError::TypeMismatch {
                        expected: contents.to_owned(),
                        found,
                    }
                    .into());
                }
            }
        }
        state.pos = reader.position();
        state.advance();
        state.scopes.push(ReadScope {
            kind,
            contents: inner,
            next: 0,
            end,
        });
        Ok(())
    }

    fn exit_container(&mut self) -> Result<(), MessageError> {
        let endian = self.endian;
        let Mode::Read(state) = &mut self.mode else {
            return Err(DecodingError::WriteOnly.into());
        };
        let Some(scope) = state.scopes.pop() else {
            return Err(StructuralError::NoOpenContainer.into());
        };
        if scope.kind == ContainerKind::Array {
            state.pos = scope.end;
            return Ok(());
        }
        let mut reader = Reader::new(&self.body, state.pos, endian);
        for ty in scope.contents.iter().skip(scope.next) {
            reader.get_value(ty)?;
        }
        state.pos = reader.position();
        Ok(())
    }

    /// Returns `true` when nothing is left to read in the innermost open
    /// container, or in the body when no container is open.
    ///
    /// Messages under construction always report `true`.
    #[must_use]
    pub fn at_end(&self) -> bool {
        match &self.mode {
            Mode::Read(state) => state.at_end(),
            Mode::Build(_) => true,
        }
    }

    /// Moves the read cursor back to the start of the body.
    ///
    /// # Errors
    ///
    /// Returns [`DecodingError::WriteOnly`] for messages under construction.
    pub fn rewind(&mut self) -> Result<(), MessageError> {
        let state = self.read_state()?;
        state.pos = 0;
        state.root_next = 0;
        state.scopes.clear();
        Ok(())
    }
}

fn reply_fields(call: &Message) -> HeaderFields {
    HeaderFields {
        reply_serial: Some(call.serial),
        destination: call.fields.sender.clone(),
        ..HeaderFields::default()
    }
}
