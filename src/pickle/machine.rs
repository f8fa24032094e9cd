use std::{collections::HashMap, rc::Rc};

use super::{PickleErr, Value};

const HIGHEST_PROTOCOL: u8 = 5;

mod op {
    pub const MARK: u8 = b'(';
    pub const STOP: u8 = b'.';
    pub const POP: u8 = b'0';
    pub const POP_MARK: u8 = b'1';
    pub const DUP: u8 = b'2';
    pub const BININT: u8 = b'J';
    pub const BININT1: u8 = b'K';
    pub const BININT2: u8 = b'M';
    pub const NONE: u8 = b'N';
    pub const REDUCE: u8 = b'R';
    pub const BINSTRING: u8 = b'T';
    pub const SHORT_BINSTRING: u8 = b'U';
    pub const BINUNICODE: u8 = b'X';
    pub const APPEND: u8 = b'a';
    pub const BUILD: u8 = b'b';
    pub const GLOBAL: u8 = b'c';
    pub const APPENDS: u8 = b'e';
    pub const BINGET: u8 = b'h';
    pub const LONG_BINGET: u8 = b'j';
    pub const EMPTY_LIST: u8 = b']';
    pub const BINPUT: u8 = b'q';
    pub const LONG_BINPUT: u8 = b'r';
    pub const SETITEM: u8 = b's';
    pub const TUPLE: u8 = b't';
    pub const EMPTY_TUPLE: u8 = b')';
    pub const SETITEMS: u8 = b'u';
    pub const BINFLOAT: u8 = b'G';
    pub const EMPTY_DICT: u8 = b'}';
    pub const BINBYTES: u8 = b'B';
    pub const SHORT_BINBYTES: u8 = b'C';

    pub const PROTO: u8 = 0x80;
    pub const NEWOBJ: u8 = 0x81;
    pub const TUPLE1: u8 = 0x85;
    pub const TUPLE2: u8 = 0x86;
    pub const TUPLE3: u8 = 0x87;
    pub const NEWTRUE: u8 = 0x88;
    pub const NEWFALSE: u8 = 0x89;
    pub const LONG1: u8 = 0x8a;
    pub const SHORT_BINUNICODE: u8 = 0x8c;
    pub const BINUNICODE8: u8 = 0x8d;
    pub const BINBYTES8: u8 = 0x8e;
    pub const STACK_GLOBAL: u8 = 0x93;
    pub const MEMOIZE: u8 = 0x94;
    pub const FRAME: u8 = 0x95;
}

/// Decodes a complete pickle stream.
///
/// Accepts streams that declare protocols 2 to 5 but only the binary opcodes
/// that plain containers, strings, numbers and in-band numpy arrays
/// (`_reconstruct` with a byte payload) are written with. Sets, frozensets,
/// `bytearray` and out-of-band buffers (`BYTEARRAY8`, `NEXT_BUFFER`,
/// `READONLY_BUFFER`) are rejected as unknown opcodes, so protocol 5 arrays
/// pickled through `_frombuffer` do not decode. Objects are not instantiated:
/// `REDUCE`, `NEWOBJ` and `BUILD` produce [`Value::Object`] nodes that
/// callers interpret.
///
/// A memoized value stays tied to its stack slot until an opcode consumes it,
/// so a container filled after `PUT` is recalled in full. Containers that
/// recall themselves while still being filled are not supported. Large byte
/// strings are shared, not copied.
///
/// # Errors
/// Returns a `PickleErr` on truncated input, unknown opcodes or a malformed
/// stack.
pub fn loads(bytes: &[u8]) -> Result<Value, PickleErr> {
    Machine::new(bytes).run()
}

/// A memo entry.
enum Memo {
    /// The value still sits at this stack index and may be mutated.
    Live(usize),
    /// The value was consumed from the stack and is final.
    Frozen(Value),
}

struct Machine<'a> {
    buf: &'a [u8],
    pos: usize,
    stack: Vec<Value>,
    marks: Vec<usize>,
    memo: HashMap<u64, Memo>,
    /// `(stack index, memo index)` of every live entry, by stack index.
    live: Vec<(usize, u64)>,
}

impl<'a> Machine<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            stack: Vec::new(),
            marks: Vec::new(),
            memo: HashMap::new(),
            live: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Value, PickleErr> {
        loop {
            let at = self.pos;
            let code = self.take_u8()?;
            match code {
                op::PROTO => {
                    let proto = self.take_u8()?;
                    if proto > HIGHEST_PROTOCOL {
                        return Err(PickleErr::UnsupportedProtocol(proto));
                    }
                }
                op::FRAME => {
                    self.take(8)?;
                }
                op::STOP => {
                    self.live.clear();
                    return self.pop(code);
                }

                op::MARK => self.marks.push(self.stack.len()),
                op::POP => {
                    self.pop(code)?;
                }
                op::POP_MARK => {
                    self.pop_mark(code)?;
                }
                op::DUP => {
                    let top = self.top(code)?.clone();
                    self.stack.push(top);
                }

                op::NONE => self.stack.push(Value::None),
                op::NEWTRUE => self.stack.push(Value::Bool(true)),
                op::NEWFALSE => self.stack.push(Value::Bool(false)),
                op::BININT => {
                    let n = i32::from_le_bytes(self.take_array()?);
                    self.stack.push(Value::Int(i64::from(n)));
                }
                op::BININT1 => {
                    let n = self.take_u8()?;
                    self.stack.push(Value::Int(i64::from(n)));
                }
                op::BININT2 => {
                    let n = u16::from_le_bytes(self.take_array()?);
                    self.stack.push(Value::Int(i64::from(n)));
                }
                op::LONG1 => {
                    let len = usize::from(self.take_u8()?);
                    let raw = self.take(len)?;
                    let n = decode_long(raw).ok_or(PickleErr::IntegerOverflow { at })?;
                    self.stack.push(Value::Int(n));
                }
                op::BINFLOAT => {
                    let f = f64::from_be_bytes(self.take_array()?);
                    self.stack.push(Value::Float(f));
                }

                op::SHORT_BINSTRING | op::SHORT_BINBYTES => {
                    let len = usize::from(self.take_u8()?);
                    self.push_bytes(len)?;
                }
                op::BINSTRING => {
                    let len = i32::from_le_bytes(self.take_array()?);
                    let len = usize::try_from(len).map_err(|_| PickleErr::NegativeLength { at })?;
                    self.push_bytes(len)?;
                }
                op::BINBYTES => {
                    let len = u32::from_le_bytes(self.take_array()?);
                    self.push_bytes(len as usize)?;
                }
                op::BINBYTES8 => {
                    let len = self.take_len8(at)?;
                    self.push_bytes(len)?;
                }
                op::SHORT_BINUNICODE => {
                    let len = usize::from(self.take_u8()?);
                    self.push_text(len, at)?;
                }
                op::BINUNICODE => {
                    let len = u32::from_le_bytes(self.take_array()?);
                    self.push_text(len as usize, at)?;
                }
                op::BINUNICODE8 => {
                    let len = self.take_len8(at)?;
                    self.push_text(len, at)?;
                }

                op::EMPTY_LIST => self.stack.push(Value::List(Vec::new())),
                op::EMPTY_TUPLE => self.stack.push(Value::Tuple(Vec::new())),
                op::EMPTY_DICT => self.stack.push(Value::Dict(Vec::new())),
                op::TUPLE => {
                    let items = self.pop_mark(code)?;
                    self.stack.push(Value::Tuple(items));
                }
                op::TUPLE1 | op::TUPLE2 | op::TUPLE3 => {
                    let n = usize::from(code - op::TUPLE1 + 1);
                    let items = self.pop_n(n, code)?;
                    self.stack.push(Value::Tuple(items));
                }
                op::APPEND => {
                    let item = self.pop(code)?;
                    self.list_top(code)?.push(item);
                }
                op::APPENDS => {
                    let items = self.pop_mark(code)?;
                    self.list_top(code)?.extend(items);
                }
                op::SETITEM => {
                    let value = self.pop(code)?;
                    let key = self.pop(code)?;
                    Value::dict_insert(self.dict_top(code)?, key, value);
                }
                op::SETITEMS => {
                    let items = self.pop_mark(code)?;
                    if items.len() % 2 != 0 {
                        return Err(PickleErr::OddSetItems { at });
                    }
                    let entries = self.dict_top(code)?;
                    let mut items = items.into_iter();
                    while let (Some(key), Some(value)) = (items.next(), items.next()) {
                        Value::dict_insert(entries, key, value);
                    }
                }

                op::BINPUT => {
                    let idx = u64::from(self.take_u8()?);
                    self.memoize(idx, code)?;
                }
                op::LONG_BINPUT => {
                    let idx = u64::from(u32::from_le_bytes(self.take_array()?));
                    self.memoize(idx, code)?;
                }
                op::MEMOIZE => {
                    let idx = self.memo.len() as u64;
                    self.memoize(idx, code)?;
                }
                op::BINGET => {
                    let idx = u64::from(self.take_u8()?);
                    self.recall(idx)?;
                }
                op::LONG_BINGET => {
                    let idx = u64::from(u32::from_le_bytes(self.take_array()?));
                    self.recall(idx)?;
                }

                op::GLOBAL => {
                    let module = self.take_line(at)?;
                    let name = self.take_line(at)?;
                    self.stack.push(Value::Global { module, name });
                }
                op::STACK_GLOBAL => {
                    let name = self.pop(code)?;
                    let module = self.pop(code)?;
                    match (module, name) {
                        (Value::Text(module), Value::Text(name)) => {
                            self.stack.push(Value::Global { module, name })
                        }
                        _ => return Err(PickleErr::Malformed { at, what: "STACK_GLOBAL operands" }),
                    }
                }
                op::REDUCE | op::NEWOBJ => {
                    let args = self.pop(code)?;
                    let callable = self.pop(code)?;
                    let value = reduce(callable, args);
                    self.stack.push(value);
                }
                op::BUILD => {
                    let state = self.pop(code)?;
                    match self.stack.last_mut() {
                        Some(Value::Object { state: slot, .. }) => *slot = Some(Box::new(state)),
                        Some(Value::Dict(entries)) => {
                            let Value::Dict(update) = state else {
                                return Err(PickleErr::Malformed { at, what: "BUILD state" });
                            };
                            for (key, value) in update {
                                Value::dict_insert(entries, key, value);
                            }
                        }
                        Some(_) => return Err(PickleErr::Malformed { at, what: "BUILD target" }),
                        None => return Err(PickleErr::StackUnderflow { opcode: code }),
                    }
                }

                other => return Err(PickleErr::UnknownOpcode { opcode: other, at }),
            }
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], PickleErr> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or(PickleErr::UnexpectedEof { at: self.pos })?;
        let buf = self.buf;
        let slice = &buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_u8(&mut self) -> Result<u8, PickleErr> {
        Ok(self.take(1)?[0])
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], PickleErr> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn take_len8(&mut self, at: usize) -> Result<usize, PickleErr> {
        let len = u64::from_le_bytes(self.take_array()?);
        usize::try_from(len).map_err(|_| PickleErr::IntegerOverflow { at })
    }

    fn take_line(&mut self, at: usize) -> Result<String, PickleErr> {
        let rest = &self.buf[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(PickleErr::UnexpectedEof { at })?;
        let line = self.take(len + 1)?;
        Ok(line[..len].iter().map(|&c| char::from(c)).collect())
    }

    fn push_bytes(&mut self, len: usize) -> Result<(), PickleErr> {
        let raw = self.take(len)?;
        self.stack.push(Value::Bytes(Rc::from(raw)));
        Ok(())
    }

    fn push_text(&mut self, len: usize, at: usize) -> Result<(), PickleErr> {
        let raw = self.take(len)?;
        let text = std::str::from_utf8(raw).map_err(|_| PickleErr::InvalidUtf8 { at })?;
        self.stack.push(Value::Text(text.to_string()));
        Ok(())
    }

    fn pop(&mut self, opcode: u8) -> Result<Value, PickleErr> {
        self.pop_n(1, opcode)?
            .pop()
            .ok_or(PickleErr::StackUnderflow { opcode })
    }

    /// Pops the top `n` values without reaching below the innermost mark.
    fn pop_n(&mut self, n: usize, opcode: u8) -> Result<Vec<Value>, PickleErr> {
        let floor = self.marks.last().copied().unwrap_or(0);
        let len = self
            .stack
            .len()
            .checked_sub(n)
            .filter(|&len| len >= floor)
            .ok_or(PickleErr::StackUnderflow { opcode })?;
        Ok(self.truncate(len))
    }

    /// Cuts the stack down to `len`, freezing memo entries for the values
    /// leaving it.
    fn truncate(&mut self, len: usize) -> Vec<Value> {
        while let Some(&(at, idx)) = self.live.last() {
            if at < len {
                break;
            }
            self.live.pop();
            if let Some(value) = self.stack.get(at) {
                self.memo.insert(idx, Memo::Frozen(value.clone()));
            }
        }
        self.stack.split_off(len)
    }

    fn top(&self, opcode: u8) -> Result<&Value, PickleErr> {
        self.stack.last().ok_or(PickleErr::StackUnderflow { opcode })
    }

    fn pop_mark(&mut self, opcode: u8) -> Result<Vec<Value>, PickleErr> {
        let mark = self.marks.pop().ok_or(PickleErr::MissingMark { opcode })?;
        if mark > self.stack.len() {
            return Err(PickleErr::StackUnderflow { opcode });
        }
        Ok(self.truncate(mark))
    }

    fn list_top(&mut self, opcode: u8) -> Result<&mut Vec<Value>, PickleErr> {
        match self.stack.last_mut() {
            Some(Value::List(items)) => Ok(items),
            Some(other) => Err(PickleErr::TypeMismatch {
                opcode,
                expected: "list",
                got: other.type_name(),
            }),
            None => Err(PickleErr::StackUnderflow { opcode }),
        }
    }

    fn dict_top(&mut self, opcode: u8) -> Result<&mut Vec<(Value, Value)>, PickleErr> {
        match self.stack.last_mut() {
            Some(Value::Dict(entries)) => Ok(entries),
            Some(other) => Err(PickleErr::TypeMismatch {
                opcode,
                expected: "dict",
                got: other.type_name(),
            }),
            None => Err(PickleErr::StackUnderflow { opcode }),
        }
    }

    fn memoize(&mut self, idx: u64, opcode: u8) -> Result<(), PickleErr> {
        let at = self
            .stack
            .len()
            .checked_sub(1)
            .ok_or(PickleErr::StackUnderflow { opcode })?;
        self.live.retain(|&(_, i)| i != idx);
        self.live.push((at, idx));
        self.memo.insert(idx, Memo::Live(at));
        Ok(())
    }

    fn recall(&mut self, idx: u64) -> Result<(), PickleErr> {
        let value = match self.memo.get(&idx) {
            Some(Memo::Live(at)) => self.stack.get(*at).cloned(),
            Some(Memo::Frozen(value)) => Some(value.clone()),
            None => None,
        }
        .ok_or(PickleErr::MissingMemo(idx))?;
        self.stack.push(value);
        Ok(())
    }
}

/// Folds calls whose result is plain data; everything else stays symbolic.
fn reduce(callable: Value, args: Value) -> Value {
    // Python 3 writes `bytes` under protocol 2 as `_codecs.encode(text, "latin1")`.
    if callable.is_global("_codecs", "encode") {
        if let Some([text, Value::Text(encoding)]) = args.as_seq() {
            if encoding == "latin1" || encoding == "latin-1" {
                if let Some(bytes) = text.as_bytes() {
                    return Value::Bytes(Rc::from(&bytes[..]));
                }
            }
        }
    }

    Value::Object {
        callable: Box::new(callable),
        args: Box::new(args),
        state: None,
    }
}

/// Two's complement, little endian.
fn decode_long(raw: &[u8]) -> Option<i64> {
    if raw.is_empty() {
        return Some(0);
    }
    if raw.len() > 8 {
        return None;
    }
    let fill = if raw[raw.len() - 1] & 0x80 != 0 { 0xff } else { 0 };
    let mut bytes = [fill; 8];
    bytes[..raw.len()].copy_from_slice(raw);
    Some(i64::from_le_bytes(bytes))
}
