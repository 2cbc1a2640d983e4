//! An interpreter for AML bytecode, the language ACPI tables use to describe
//! devices, power management methods, and hardware access patterns.
//!
//! Every opcode carries a *parse program*: a micro-instruction stream
//! describing how to decode its operands and what to do with them (see
//! [`opcode`]). The interpreter walks these programs with a small stack
//! machine. Each in-flight opcode is an `OpContext`; when a parse program
//! needs a dynamic argument (which is itself an opcode), the context is
//! *preempted* and a fresh context is pushed for the argument. When the
//! argument finishes, it deposits its result as the next item of the
//! preempted parent and the parent resumes. Method calls push whole new
//! `CallFrame`s the same way, so the machine never recurses natively and
//! pathological bytecode cannot blow the host stack.

#![no_std]

extern crate alloc;

pub mod namespace;
pub mod object;
pub mod op_region;
pub mod opcode;

use alloc::{
    boxed::Box,
    collections::btree_map::BTreeMap,
    format,
    string::String,
    sync::Arc,
    vec,
    vec::Vec,
};
use log::{error, info, trace, warn};
use namespace::{NameSeg, Namespace, NodeId};
use object::{
    buffer_index_read,
    buffer_index_write,
    copy_zero_extended,
    AssignBehavior,
    BufferField,
    MethodFlags,
    Object,
    ObjectType,
    ReferenceKind,
    StringKind,
};
use op_region::{OpRegion, RegionHandler, RegionSpace};
use opcode::*;
use spinning_top::Spinlock;

pub struct Interpreter<H>
where
    H: Handler,
{
    handler: H,
    pub namespace: Spinlock<Namespace>,
    dsdt_revision: u8,
    region_handlers: Spinlock<BTreeMap<RegionSpace, Box<dyn RegionHandler>>>,
}

unsafe impl<H> Send for Interpreter<H> where H: Handler + Send {}
unsafe impl<H> Sync for Interpreter<H> where H: Handler + Send {}

impl<H> Interpreter<H>
where
    H: Handler,
{
    pub fn new(handler: H, dsdt_revision: u8) -> Interpreter<H> {
        info!("Initializing AML interpreter v{}", env!("CARGO_PKG_VERSION"));
        Interpreter {
            handler,
            namespace: Spinlock::new(Namespace::new()),
            dsdt_revision,
            region_handlers: Spinlock::new(BTreeMap::new()),
        }
    }

    /// Run a table's top-level byte stream. Named objects created by the
    /// stream persist in the namespace after the load.
    pub fn load_table(&self, stream: &[u8]) -> Result<(), AmlError> {
        let method = Arc::new(Object::Method {
            code: stream.to_vec(),
            flags: MethodFlags(0),
            named_objects_persist: true,
        });
        let root = self.namespace.lock().root();
        self.execute_method(root, method, Vec::new())?;
        Ok(())
    }

    /// Invoke an object by its absolute dotted path, with the given set of
    /// arguments. If the referenced object is not a method, the object is
    /// returned instead - this is useful for objects that can either be
    /// defined directly, or through a method (e.g. a `_CRS` object).
    pub fn invoke_path(&self, path: &str, args: Vec<Arc<Object>>) -> Result<Arc<Object>, AmlError> {
        info!("Invoking AML object: {}", path);

        let (node, object) = {
            let namespace = self.namespace.lock();
            let node = namespace.get_by_path(path)?;
            let object = namespace.object_of(node).ok_or(AmlError::ObjectNotFound)?;
            (node, object)
        };
        let object = object.unwrap_transparent_reference();

        match *object {
            Object::Method { .. } => self.execute_method(node, object.clone(), args),
            _ => Ok(object),
        }
    }

    /// Evaluate a control method against the given namespace scope. The
    /// result object is `Uninitialized` if the method does not return a
    /// value.
    pub fn execute_method(
        &self,
        scope: NodeId,
        method: Arc<Object>,
        args: Vec<Arc<Object>>,
    ) -> Result<Arc<Object>, AmlError> {
        let Object::Method { code, flags, .. } = &*method else {
            return Err(AmlError::ObjectNotOfExpectedType {
                expected: ObjectType::Method,
                got: method.typ(),
            });
        };
        if args.len() != flags.arg_count() {
            return Err(AmlError::MethodArgCountIncorrect);
        }
        let code_len = code.len();

        let mut context = ExecutionContext {
            call_stack: vec![CallFrame::new(method.clone(), args, scope, code_len)],
            ret: Arc::new(Object::Uninitialized),
            skip_else: false,
        };

        let result = self.do_execute(&mut context);

        // A fatal error leaves frames and op contexts behind; unwind them,
        // releasing owned objects and uninstalling temporary nodes.
        while let Some(mut frame) = context.call_stack.pop() {
            self.clear_frame(&mut frame);
        }

        result.map(|()| context.ret)
    }

    pub fn install_region_handler<RH>(&self, space: RegionSpace, handler: RH)
    where
        RH: RegionHandler + 'static,
    {
        let mut handlers = self.region_handlers.lock();
        assert!(handlers.get(&space).is_none(), "Tried to install handler for same space twice!");
        handlers.insert(space, Box::new(handler));
    }

    fn is_rev1(&self) -> bool {
        self.dsdt_revision < 2
    }

    fn sizeof_int(&self) -> usize {
        if self.is_rev1() { 4 } else { 8 }
    }

    fn ones(&self) -> u64 {
        if self.is_rev1() { 0xFFFF_FFFF } else { u64::MAX }
    }

    /*
     * The outer driver: fetch an opcode when nothing is in flight, otherwise
     * keep feeding the in-flight op's parse program. Ends code blocks and
     * retires finished frames in between.
     */
    fn do_execute(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        loop {
            let fetched = if context.has_non_preempted_op() {
                None
            } else {
                if context.call_stack.is_empty() {
                    break;
                }
                if self.maybe_end_block(context) {
                    continue;
                }
                if !context.cur_frame().has_code() {
                    let mut frame = context.call_stack.pop().unwrap();
                    self.clear_frame(&mut frame);
                    continue;
                }
                Some(self.fetch_op(context)?)
            };

            self.exec_op(context, fetched)?;
            context.skip_else = false;
        }
        Ok(())
    }

    fn fetch_op(&self, context: &mut ExecutionContext) -> Result<(&'static OpSpec, u16), AmlError> {
        let frame = context.cur_frame_mut();
        let method = frame.method.clone();
        let code = method_code(&method);

        if frame.code_offset >= code.len() {
            return Err(AmlError::RunOutOfStream);
        }
        let mut op = code[frame.code_offset] as u16;
        frame.code_offset += 1;

        if op == EXT_OPCODE_PREFIX as u16 {
            if frame.code_offset >= code.len() {
                return Err(AmlError::RunOutOfStream);
            }
            op = (op << 8) | code[frame.code_offset] as u16;
            frame.code_offset += 1;
        }

        match op_spec(op) {
            Some(spec) => {
                trace!("Processing op '{}' ({:#06x})", spec.name, op);
                Ok((spec, op))
            }
            None => {
                warn!("Illegal or reserved opcode {:#06x}", op);
                Err(AmlError::IllegalOpcode(op))
            }
        }
    }

    /// If the current frame's cursor sits at the end of the innermost code
    /// block, retire the block. A `While` block loops back to its opening
    /// opcode; an `If` block arms `skip_else` for the `Else` that may follow.
    fn maybe_end_block(&self, context: &mut ExecutionContext) -> bool {
        let frame = context.cur_frame_mut();
        let Some(block) = frame.code_blocks.last() else { return false };
        if frame.code_offset != block.end {
            return false;
        }

        let kind = block.kind;
        if kind == BlockKind::While {
            frame.code_offset = block.begin;
        }
        frame.code_blocks.pop();
        if kind == BlockKind::Scope {
            self.update_scope(context.cur_frame_mut());
        }

        context.skip_else = kind == BlockKind::If;
        true
    }

    fn update_scope(&self, frame: &mut CallFrame) {
        frame.cur_scope = frame
            .code_blocks
            .iter()
            .rev()
            .find(|block| block.kind == BlockKind::Scope)
            .and_then(|block| block.node)
            .unwrap_or_else(|| self.namespace.lock().root());
    }

    /// Release everything a frame still owns: leftover op contexts (and the
    /// uninstalled nodes they hold), then temporary namespace nodes in
    /// reverse install order.
    fn clear_frame(&self, frame: &mut CallFrame) {
        let mut namespace = self.namespace.lock();
        while let Some(op_context) = frame.pending_ops.pop() {
            for item in op_context.items {
                if let Item::MethodLocalNode(Some(node)) = item {
                    namespace.free(node);
                }
            }
        }
        for node in frame.temp_nodes.drain(..).rev() {
            namespace.uninstall(node);
        }
        frame.code_blocks.clear();
    }

    fn pop_op(&self, context: &mut ExecutionContext) {
        let frame = context.cur_frame_mut();
        let op_context = frame.pending_ops.pop().unwrap();
        for item in op_context.items {
            if let Item::MethodLocalNode(Some(node)) = item {
                self.namespace.lock().free(node);
            }
        }
    }

    /*
     * The parse-program interpreter. Walks the current op context's program
     * until it preempts for a dynamic argument, dispatches a method call,
     * or pops at END.
     */
    fn exec_op(
        &self,
        context: &mut ExecutionContext,
        fetched: Option<(&'static OpSpec, u16)>,
    ) -> Result<(), AmlError> {
        if let Some((spec, code)) = fetched {
            context.cur_frame_mut().pending_ops.push(OpContext::new(spec, code));
        }

        let prev_parse_op = context.prev_parse_op();

        loop {
            /*
             * Type check a fresh op against what the preempted parent
             * expects. This catches most violations up front; Operand is the
             * exception since its type is only known after evaluation.
             */
            if context.cur_op_ref().pc == 0 {
                if let Some(prev) = prev_parse_op {
                    op_typecheck(prev, context.cur_op_ref().spec)?;
                }
            }

            let parse_op = {
                let op_context = context.cur_op();
                let byte = op_context.spec.ops[op_context.pc];
                op_context.pc += 1;
                let Some(parse_op) = ParseOp::from_byte(byte) else {
                    warn!("Op '{}': unhandled parser op {:#04x}", op_context.spec.name, byte);
                    return Err(AmlError::Unimplemented);
                };
                parse_op
            };

            match parse_op {
                ParseOp::End => {
                    {
                        let frame = context.cur_frame_mut();
                        let op_context = frame.pending_ops.last().unwrap();
                        if let Some(idx) = op_context.tracked_pkg_idx {
                            frame.code_offset = op_context.items[idx].pkg().end;
                        }
                    }
                    self.pop_op(context);
                    if let Some(op_context) = context.cur_frame_mut().pending_ops.last_mut() {
                        op_context.preempted = false;
                        op_context.pc += 1;
                    }
                    return Ok(());
                }

                /*
                 * Preempt: the next argument is itself an opcode. Step the pc
                 * back over this parse op so the parent's expectation stays
                 * readable while the child runs; END skips forward again.
                 */
                ParseOp::SimpleName
                | ParseOp::Supername
                | ParseOp::SupernameImplicitDeref
                | ParseOp::SupernameOrUnresolved
                | ParseOp::TermArg
                | ParseOp::TermArgUnwrapInternal
                | ParseOp::TermArgOrNamedObject
                | ParseOp::TermArgOrNamedObjectOrUnresolved
                | ParseOp::Operand
                | ParseOp::ComputationalData
                | ParseOp::Target => {
                    let op_context = context.cur_op();
                    op_context.items.push(Item::EmptySlot);
                    op_context.preempted = true;
                    op_context.pc -= 1;
                    return Ok(());
                }

                ParseOp::TrackedPkglen | ParseOp::Pkglen => {
                    let frame = context.cur_frame_mut();
                    let pkg = parse_package_length(frame)?;
                    let op_context = frame.pending_ops.last_mut().unwrap();
                    if parse_op == ParseOp::TrackedPkglen {
                        op_context.tracked_pkg_idx = Some(op_context.items.len());
                    }
                    op_context.items.push(Item::Pkg(pkg));
                }

                ParseOp::LoadInlineImm | ParseOp::LoadInlineImmAsObject => {
                    let op_context = context.cur_op();
                    let width = op_context.next_program_byte() as usize;
                    let mut bytes = [0u8; 8];
                    bytes[..width]
                        .copy_from_slice(&op_context.spec.ops[op_context.pc..op_context.pc + width]);
                    op_context.pc += width;

                    let value = u64::from_le_bytes(bytes);
                    let item = if parse_op == ParseOp::LoadInlineImm {
                        Item::Imm(value)
                    } else {
                        Item::Obj(Arc::new(Object::Integer(value)))
                    };
                    op_context.items.push(item);
                }

                ParseOp::LoadImm | ParseOp::LoadImmAsObject => {
                    let width = context.cur_op().next_program_byte() as usize;
                    let frame = context.cur_frame_mut();
                    let method = frame.method.clone();
                    let code = method_code(&method);
                    if code.len() - frame.code_offset < width {
                        return Err(AmlError::BadBytecode);
                    }
                    let mut bytes = [0u8; 8];
                    bytes[..width]
                        .copy_from_slice(&code[frame.code_offset..frame.code_offset + width]);
                    frame.code_offset += width;

                    let value = u64::from_le_bytes(bytes);
                    let item = if parse_op == ParseOp::LoadImm {
                        Item::Imm(value)
                    } else {
                        Item::Obj(Arc::new(Object::Integer(value)))
                    };
                    context.cur_op().items.push(item);
                }

                ParseOp::LoadFalseObject => {
                    context.cur_op().items.push(Item::Obj(Arc::new(Object::Integer(0))));
                }

                ParseOp::LoadTrueObject => {
                    let ones = self.ones();
                    context.cur_op().items.push(Item::Obj(Arc::new(Object::Integer(ones))));
                }

                ParseOp::RecordAmlPc => {
                    let offset = context.cur_frame().code_offset;
                    context.cur_op().items.push(Item::Imm(offset as u64));
                }

                ParseOp::TruncateNumber => {
                    if self.is_rev1() {
                        let obj = context.cur_op_ref().items.last().unwrap().obj().clone();
                        if let Object::Integer(value) = obj.gain_mut() {
                            *value &= 0xFFFF_FFFF;
                        }
                    }
                }

                ParseOp::Typecheck => {
                    let expected = context.cur_op().next_program_byte();
                    let op_context = context.cur_op_ref();
                    let got = op_context.items.last().unwrap().obj().typ();
                    if got as u8 != expected {
                        warn!(
                            "Op '{}': bad object type: expected {}, got {}!",
                            op_context.spec.name, expected, got as u8
                        );
                        return Err(AmlError::BadBytecode);
                    }
                }

                ParseOp::Todo => {
                    let op_context = context.cur_op_ref();
                    warn!(
                        "Op '{}' ({:#06x}): not yet implemented",
                        op_context.spec.name, op_context.code
                    );
                    return Err(AmlError::Unimplemented);
                }

                ParseOp::BadOpcode | ParseOp::Unreachable => {
                    let op_context = context.cur_op_ref();
                    warn!(
                        "Op '{}' ({:#06x}): invalid/unexpected opcode",
                        op_context.spec.name, op_context.code
                    );
                    return Err(AmlError::BadBytecode);
                }

                ParseOp::AmlPcDecrement => {
                    context.cur_frame_mut().code_offset -= 1;
                }

                ParseOp::ImmDecrement => {
                    let idx = context.cur_op().next_program_byte() as usize;
                    let Item::Imm(value) = &mut context.cur_op().items[idx] else { panic!() };
                    *value -= 1;
                }

                ParseOp::IfHasData => {
                    let skip = context.cur_op().next_program_byte() as usize;
                    let offset = context.cur_frame().code_offset;
                    let op_context = context.cur_op();
                    let pkg = op_context.items[op_context.tracked_pkg_idx.unwrap()].pkg();
                    if offset >= pkg.end {
                        op_context.pc += skip;
                    }
                }

                ParseOp::IfNull | ParseOp::IfNotNull => {
                    let op_context = context.cur_op();
                    let idx = op_context.next_program_byte() as usize;
                    let skip = op_context.next_program_byte() as usize;
                    let is_null = op_context.items[idx].is_null();
                    let skip_if_null = parse_op == ParseOp::IfNotNull;
                    if is_null == skip_if_null {
                        op_context.pc += skip;
                    }
                }

                ParseOp::IfEquals => {
                    let op_context = context.cur_op();
                    let idx = op_context.next_program_byte() as usize;
                    let value = op_context.next_program_byte() as u64;
                    let skip = op_context.next_program_byte() as usize;
                    if op_context.items[idx].imm() != value {
                        op_context.pc += skip;
                    }
                }

                ParseOp::Jmp => {
                    let op_context = context.cur_op();
                    op_context.pc = op_context.spec.ops[op_context.pc] as usize;
                }

                ParseOp::CreateNamestring
                | ParseOp::ExistingNamestring
                | ParseOp::ExistingNamestringOrNull => {
                    self.do_resolve_namestring(context, parse_op, prev_parse_op)?;
                }

                ParseOp::InvokeHandler => {
                    self.dispatch_handler(context)?;
                }

                ParseOp::InstallNamespaceNode => {
                    let idx = context.cur_op().next_program_byte() as usize;
                    let Item::MethodLocalNode(Some(node)) = context.cur_op_ref().items[idx] else {
                        panic!()
                    };
                    self.namespace.lock().install(node)?;

                    let frame = context.cur_frame_mut();
                    let persist = {
                        let Object::Method { named_objects_persist, .. } = &*frame.method else {
                            panic!()
                        };
                        *named_objects_persist
                    };
                    if !persist {
                        frame.temp_nodes.push(node);
                    }
                    context.cur_op().items[idx] = Item::MethodLocalNode(None);
                }

                ParseOp::ObjectTransferToPrev | ParseOp::ObjectCopyToPrev => {
                    let Some(prev) = prev_parse_op else { continue };

                    let src = context.cur_op_ref().items.last().unwrap().obj().clone();
                    let src = match prev {
                        ParseOp::TermArgUnwrapInternal
                        | ParseOp::ComputationalData
                        | ParseOp::Operand => {
                            let unwrapped = src.unwrap_transparent_reference();
                            if prev == ParseOp::Operand {
                                typecheck_operand(&unwrapped)?;
                            } else if prev == ParseOp::ComputationalData {
                                typecheck_computational_data(&unwrapped)?;
                            }
                            unwrapped
                        }
                        ParseOp::SupernameImplicitDeref => object_deref_implicit(&src),
                        ParseOp::Supername
                        | ParseOp::SupernameOrUnresolved
                        | ParseOp::SimpleName
                        | ParseOp::TermArg
                        | ParseOp::TermArgOrNamedObject
                        | ParseOp::TermArgOrNamedObjectOrUnresolved
                        | ParseOp::Target => src,
                        _ => {
                            warn!("Don't know how to copy/transfer object to {:?}", prev);
                            return Err(AmlError::InvalidArgument);
                        }
                    };

                    let dst = if parse_op == ParseOp::ObjectTransferToPrev {
                        src
                    } else {
                        Arc::new(src.clone_with(AssignBehavior::Deep))
                    };

                    let (_, prev_context) = context.cur_and_prev_ops();
                    *prev_context.unwrap().items.last_mut().unwrap() = Item::Obj(dst);
                }

                ParseOp::StoreToTarget => {
                    let dst_idx = context.cur_op().next_program_byte() as usize;
                    let (dst, src) = {
                        let items = &context.cur_op_ref().items;
                        (items[dst_idx].obj().clone(), items.last().unwrap().obj().clone())
                    };
                    self.store_to_target(&dst, &src)?;
                }

                ParseOp::StoreToTargetIndirect => {
                    let dst_idx = context.cur_op().next_program_byte() as usize;
                    let src_idx = context.cur_op().next_program_byte() as usize;
                    let (dst, src) = {
                        let items = &context.cur_op_ref().items;
                        (items[dst_idx].obj().clone(), items[src_idx].obj().clone())
                    };
                    self.store_to_target(&dst, &src)?;
                }

                ParseOp::ObjectConvertToShallowCopy | ParseOp::ObjectConvertToDeepCopy => {
                    let behavior = if parse_op == ParseOp::ObjectConvertToShallowCopy {
                        AssignBehavior::Shallow
                    } else {
                        AssignBehavior::Deep
                    };
                    let op_context = context.cur_op();
                    let Some(Item::Obj(temp)) = op_context.items.pop() else { panic!() };
                    op_context.items.last().unwrap().obj().assign(&temp, behavior);
                }

                ParseOp::DispatchMethodCall => {
                    self.dispatch_method_call(context)?;
                    return Ok(());
                }

                ParseOp::ConvertNamestring => {
                    self.convert_namestring(context, prev_parse_op)?;
                }
            }
        }
    }

    fn do_resolve_namestring(
        &self,
        context: &mut ExecutionContext,
        parse_op: ParseOp,
        prev_parse_op: Option<ParseOp>,
    ) -> Result<(), AmlError> {
        let create = parse_op == ParseOp::CreateNamestring;
        let saved_offset = context.cur_frame().code_offset;

        let result = {
            let mut namespace = self.namespace.lock();
            resolve_name_string(
                context.cur_frame_mut(),
                &mut namespace,
                if create { ResolveBehavior::CreateLastSeg } else { ResolveBehavior::FindExisting },
            )
        };

        let item = match result {
            Ok(node) => {
                if create {
                    Item::MethodLocalNode(Some(node))
                } else {
                    Item::Node(Some(node))
                }
            }
            Err(AmlError::ObjectNotFound) => {
                let allowed = match prev_parse_op {
                    Some(prev) => {
                        parse_op_allows_unresolved(prev) && parse_op_allows_unresolved(parse_op)
                    }
                    None => context.cur_op_ref().code == EXTERNAL_OP,
                };
                if !allowed {
                    self.log_resolution_failure(context, saved_offset, create, AmlError::ObjectNotFound);
                    return Err(AmlError::ObjectNotFound);
                }
                Item::Node(None)
            }
            Err(err) => {
                self.log_resolution_failure(context, saved_offset, create, err.clone());
                return Err(err);
            }
        };

        context.cur_op().items.push(item);
        Ok(())
    }

    fn log_resolution_failure(
        &self,
        context: &ExecutionContext,
        offset: usize,
        create: bool,
        err: AmlError,
    ) {
        let method = context.cur_frame().method.clone();
        let path = name_string_to_path(method_code(&method), offset)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_else(|_| String::from("<unknown>"));
        error!(
            "Failed to {} named object '{}': {:?}",
            if create { "create" } else { "resolve" },
            path,
            err
        );
    }

    /// A resolved name string turned out to need different decoding: methods
    /// become calls (unless the parent wants a SuperName), buffer fields
    /// become reads. Rewrite the in-flight op and restart its program.
    fn convert_namestring(
        &self,
        context: &mut ExecutionContext,
        prev_parse_op: Option<ParseOp>,
    ) -> Result<(), AmlError> {
        let node = context.cur_op_ref().items.last().unwrap().node();
        let object = self.namespace.lock().object_of(node).ok_or(AmlError::InvalidArgument)?;
        let object = object.unwrap_transparent_reference();

        let new_op = match &*object {
            Object::Method { flags, .. } => {
                let should_invoke = match prev_parse_op {
                    Some(ParseOp::TermArgOrNamedObject)
                    | Some(ParseOp::TermArgOrNamedObjectOrUnresolved) => false,
                    Some(prev) => !parse_op_wants_supername(prev),
                    None => true,
                };
                if should_invoke {
                    INTERNAL_METHOD_CALL0_OP + flags.arg_count() as u16
                } else {
                    INTERNAL_NAMED_OBJECT_OP
                }
            }
            Object::BufferField(field) => {
                let wants_data = prev_parse_op.map(parse_op_wants_term_arg).unwrap_or(false);
                if wants_data {
                    match self.buffer_field_read_type(field) {
                        ObjectType::Buffer => INTERNAL_FIELD_READ_AS_BUFFER_OP,
                        _ => INTERNAL_FIELD_READ_AS_INTEGER_OP,
                    }
                } else {
                    INTERNAL_NAMED_OBJECT_OP
                }
            }
            _ => INTERNAL_NAMED_OBJECT_OP,
        };

        let op_context = context.cur_op();
        op_context.spec = op_spec(new_op).unwrap();
        op_context.code = new_op;
        op_context.pc = 0;
        Ok(())
    }

    fn buffer_field_read_type(&self, field: &BufferField) -> ObjectType {
        let max_integer_bits = if self.is_rev1() { 32 } else { 64 };
        if field.bit_length > max_integer_bits || field.force_buffer {
            ObjectType::Buffer
        } else {
            ObjectType::Integer
        }
    }

    fn dispatch_method_call(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let (method, scope, args) = {
            let op_context = context.cur_op();
            let node = op_context.items[0].node();
            let method = self
                .namespace
                .lock()
                .object_of(node)
                .ok_or(AmlError::InvalidArgument)?
                .unwrap_transparent_reference();
            let args: Vec<Arc<Object>> =
                op_context.items[2..].iter().map(|item| item.obj().clone()).collect();

            // The return slot the callee's Return will target.
            op_context.items.push(Item::Obj(Arc::new(Object::Uninitialized)));
            (method, node, args)
        };

        let Object::Method { code, .. } = &*method else {
            return Err(AmlError::ObjectNotOfExpectedType {
                expected: ObjectType::Method,
                got: method.typ(),
            });
        };
        let code_len = code.len();

        context.call_stack.push(CallFrame::new(method.clone(), args, scope, code_len));
        Ok(())
    }

    /*
     * Opcode handlers. Each one consumes the item layout its parse program
     * produced and pushes any results as further items.
     */
    fn dispatch_handler(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let code = context.cur_op_ref().code;
        match code {
            LOCAL0_OP..=LOCAL7_OP => {
                self.handle_arg_or_local(context, code - LOCAL0_OP, ReferenceKind::Local)
            }
            ARG0_OP..=ARG6_OP => {
                self.handle_arg_or_local(context, code - ARG0_OP, ReferenceKind::Arg)
            }
            STRING_PREFIX => self.handle_string(context),
            ADD_OP | SUBTRACT_OP | MULTIPLY_OP | DIVIDE_OP | SHIFT_LEFT_OP | SHIFT_RIGHT_OP
            | AND_OP | NAND_OP | OR_OP | NOR_OP | XOR_OP | MOD_OP => {
                self.handle_binary_math(context)
            }
            NOT_OP | FIND_SET_LEFT_BIT_OP | FIND_SET_RIGHT_BIT_OP => {
                self.handle_unary_math(context)
            }
            INCREMENT_OP | DECREMENT_OP => self.handle_inc_dec(context),
            LNOT_OP => self.handle_logical_not(context),
            LAND_OP | LOR_OP | LEQUAL_OP | LGREATER_OP | LLESS_OP => {
                self.handle_binary_logic(context)
            }
            IF_OP | ELSE_OP | WHILE_OP | SCOPE_OP | DEVICE_OP | PROCESSOR_OP | POWER_RES_OP
            | THERMAL_ZONE_OP => self.handle_code_block(context),
            CONTINUE_OP | BREAK_OP => self.handle_control_flow(context),
            RETURN_OP => self.handle_return(context),
            METHOD_OP => self.handle_create_method(context),
            MUTEX_OP => self.handle_create_mutex(context),
            STORE_OP | COPY_OBJECT_OP => self.handle_copy_object_or_store(context),
            REF_OF_OP | COND_REF_OF_OP | DEREF_OF_OP => self.handle_ref_or_deref_of(context),
            INTERNAL_NAMED_OBJECT_OP => self.handle_named_object(context),
            INTERNAL_FIELD_READ_AS_BUFFER_OP | INTERNAL_FIELD_READ_AS_INTEGER_OP => {
                self.handle_field_read(context)
            }
            BUFFER_OP => self.handle_buffer(context),
            PACKAGE_OP | VAR_PACKAGE_OP => self.handle_package(context),
            NAME_OP => self.handle_create_named(context),
            ALIAS_OP => self.handle_create_alias(context),
            OP_REGION_OP => self.handle_create_op_region(context),
            FIELD_OP => self.handle_create_field(context),
            CREATE_BIT_FIELD_OP | CREATE_BYTE_FIELD_OP | CREATE_WORD_FIELD_OP
            | CREATE_DWORD_FIELD_OP | CREATE_QWORD_FIELD_OP | CREATE_FIELD_OP => {
                self.handle_create_buffer_field(context)
            }
            TO_INTEGER_OP | TO_BUFFER_OP | TO_DECIMAL_STRING_OP | TO_HEX_STRING_OP => {
                self.handle_to(context)
            }
            TO_STRING_OP => self.handle_to_string(context),
            CONCAT_OP => self.handle_concatenate(context),
            SIZE_OF_OP => self.handle_sizeof(context),
            OBJECT_TYPE_OP => self.handle_object_type(context),
            INDEX_OP => self.handle_index(context),
            MID_OP => self.handle_mid(context),
            TIMER_OP => self.handle_timer(context),
            DEBUG_OP => {
                context.cur_op().items.push(Item::Obj(Arc::new(Object::Debug)));
                Ok(())
            }
            BREAKPOINT_OP => {
                self.handler.breakpoint();
                Ok(())
            }
            _ => {
                warn!(
                    "Op '{}' ({:#06x}): no dedicated handler installed",
                    context.cur_op_ref().spec.name,
                    code
                );
                Err(AmlError::Unimplemented)
            }
        }
    }

    fn handle_arg_or_local(
        &self,
        context: &mut ExecutionContext,
        idx: u16,
        kind: ReferenceKind,
    ) -> Result<(), AmlError> {
        let idx = idx as usize;
        let frame = context.cur_frame_mut();
        let slot = match kind {
            ReferenceKind::Arg => &mut frame.args[idx],
            _ => &mut frame.locals[idx],
        };

        if slot.is_none() {
            *slot = Some(Arc::new(Object::Reference {
                kind,
                inner: Arc::new(Object::Uninitialized),
            }));
        }

        let obj = slot.clone().unwrap();
        context.cur_op().items.push(Item::Obj(obj));
        Ok(())
    }

    fn handle_string(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let frame = context.cur_frame_mut();
        let method = frame.method.clone();
        let code = method_code(&method);

        let start = frame.code_offset;
        let mut length = 0;
        while start + length < code.len() && code[start + length] != 0x00 {
            length += 1;
        }
        if start + length >= code.len() {
            // The terminator is missing.
            return Err(AmlError::BadBytecode);
        }

        let data = code[start..start + length].to_vec();
        frame.code_offset += length + 1;
        context
            .cur_op()
            .items
            .push(Item::Obj(Arc::new(Object::String { data, kind: StringKind::Normal })));
        Ok(())
    }

    fn handle_binary_math(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let op = context.cur_op_ref().code;
        let (lhs, rhs) = {
            let items = &context.cur_op_ref().items;
            (items[0].obj().as_integer()?, items[1].obj().as_integer()?)
        };

        if op == DIVIDE_OP {
            let (quotient, remainder) = if rhs > 0 {
                (lhs / rhs, lhs % rhs)
            } else {
                warn!("Attempted division by zero!");
                (0, 0)
            };
            let items = &mut context.cur_op().items;
            items.push(Item::Obj(Arc::new(Object::Integer(remainder))));
            items.push(Item::Obj(Arc::new(Object::Integer(quotient))));
            return Ok(());
        }

        let result = match op {
            ADD_OP => lhs.wrapping_add(rhs),
            SUBTRACT_OP => lhs.wrapping_sub(rhs),
            MULTIPLY_OP => lhs.wrapping_mul(rhs),
            SHIFT_LEFT_OP | SHIFT_RIGHT_OP => {
                if rhs <= if self.is_rev1() { 31 } else { 63 } {
                    if op == SHIFT_LEFT_OP { lhs << rhs } else { lhs >> rhs }
                } else {
                    0
                }
            }
            AND_OP => lhs & rhs,
            NAND_OP => !(lhs & rhs),
            OR_OP => lhs | rhs,
            NOR_OP => !(lhs | rhs),
            XOR_OP => lhs ^ rhs,
            MOD_OP => {
                if rhs > 0 {
                    lhs % rhs
                } else {
                    warn!("Attempted division by zero!");
                    0
                }
            }
            _ => panic!(),
        };

        context.cur_op().items.push(Item::Obj(Arc::new(Object::Integer(result))));
        Ok(())
    }

    fn handle_unary_math(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let op = context.cur_op_ref().code;
        let operand = context.cur_op_ref().items[0].obj().as_integer()?;

        let result = match op {
            NOT_OP => {
                let value = !operand;
                if self.is_rev1() { value & 0xFFFF_FFFF } else { value }
            }
            FIND_SET_RIGHT_BIT_OP => {
                if operand == 0 { 0 } else { operand.trailing_zeros() as u64 + 1 }
            }
            FIND_SET_LEFT_BIT_OP => {
                if operand == 0 { 0 } else { 64 - operand.leading_zeros() as u64 }
            }
            _ => panic!(),
        };

        context.cur_op().items.push(Item::Obj(Arc::new(Object::Integer(result))));
        Ok(())
    }

    fn handle_inc_dec(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let increment = context.cur_op_ref().code == INCREMENT_OP;
        let obj = context.cur_op_ref().items[0].obj().clone();
        let Object::Integer(value) = obj.gain_mut() else { panic!() };
        *value = if increment { value.wrapping_add(1) } else { value.wrapping_sub(1) };
        Ok(())
    }

    fn handle_logical_not(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let operand = context.cur_op_ref().items[0].obj().as_integer()?;
        let result = if operand == 0 { self.ones() } else { 0 };
        context.cur_op().items.push(Item::Obj(Arc::new(Object::Integer(result))));
        Ok(())
    }

    fn handle_binary_logic(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let op = context.cur_op_ref().code;
        let (lhs, rhs) = {
            let items = &context.cur_op_ref().items;
            (items[0].obj().clone(), items[1].obj().clone())
        };

        let result = match op {
            LEQUAL_OP | LGREATER_OP | LLESS_OP => {
                // TODO: typecheck at parse time
                if lhs.typ() != rhs.typ() {
                    return Err(AmlError::BadBytecode);
                }
                match (&*lhs, &*rhs) {
                    (Object::Integer(lhs), Object::Integer(rhs)) => match op {
                        LEQUAL_OP => lhs == rhs,
                        LGREATER_OP => lhs > rhs,
                        _ => lhs < rhs,
                    },
                    _ => {
                        // Content comparison with a length tiebreak.
                        let lhs = lhs.storage_bytes(self.sizeof_int(), false)?;
                        let rhs = rhs.storage_bytes(self.sizeof_int(), false)?;
                        match op {
                            LEQUAL_OP => lhs == rhs,
                            LGREATER_OP => lhs > rhs,
                            _ => lhs < rhs,
                        }
                    }
                }
            }
            _ => {
                // NT only looks at the first 4 bytes of a buffer.
                let lhs = lhs.to_integer(4);
                let rhs = rhs.to_integer(4);
                if op == LAND_OP { lhs > 0 && rhs > 0 } else { lhs > 0 || rhs > 0 }
            }
        };

        let result = if result { self.ones() } else { 0 };
        context.cur_op().items.push(Item::Obj(Arc::new(Object::Integer(result))));
        Ok(())
    }

    fn handle_sizeof(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let obj = context.cur_op_ref().items[0].obj().clone();
        let obj =
            if matches!(&*obj, Object::Reference { .. }) { obj.unwrap_reference() } else { obj };

        let result = match &*obj {
            // Strings count without their trailing NUL.
            Object::String { data, .. } => data.len(),
            Object::Buffer(data) => data.len(),
            Object::Package(elements) => elements.len(),
            _ => {
                warn!(
                    "Invalid argument for Sizeof: {}, expected String/Buffer/Package",
                    obj.type_name()
                );
                return Err(AmlError::BadBytecode);
            }
        };

        context.cur_op().items.push(Item::Obj(Arc::new(Object::Integer(result as u64))));
        Ok(())
    }

    fn handle_object_type(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let obj = context.cur_op_ref().items[0].obj().clone();
        let obj =
            if matches!(&*obj, Object::Reference { .. }) { obj.unwrap_reference() } else { obj };

        let typ = match obj.typ() {
            ObjectType::BufferIndex => ObjectType::BufferField,
            typ => typ,
        };
        context.cur_op().items.push(Item::Obj(Arc::new(Object::Integer(typ as u64))));
        Ok(())
    }

    fn handle_timer(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        // Monotonically-increasing, in 100ns units.
        let ticks = self.handler.nanos_since_boot() / 100;
        context.cur_op().items.push(Item::Obj(Arc::new(Object::Integer(ticks))));
        Ok(())
    }

    fn handle_ref_or_deref_of(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let code = context.cur_op_ref().code;
        let src = context.cur_op_ref().items[0].obj().clone();

        if code == DEREF_OF_OP {
            let was_a_reference = matches!(&*src, Object::Reference { .. });
            /*
             * DerefOf grabs the bottom-most object that is not a reference,
             * mimicking NT's driver. ACPICA dereferences one level.
             */
            let src = if was_a_reference { src.unwrap_reference() } else { src };

            if let Object::BufferIndex { backing, idx } = &*src {
                let value = buffer_index_read(backing, *idx) as u64;
                context.cur_op().items.push(Item::Obj(Arc::new(Object::Integer(value))));
                return Ok(());
            }

            if !was_a_reference {
                warn!("Invalid DerefOf argument: {}, expected a reference", src.type_name());
                return Err(AmlError::BadBytecode);
            }

            let result = Arc::new(src.clone_with(AssignBehavior::Shallow));
            context.cur_op().items.push(Item::Obj(result));
            return Ok(());
        }

        // RefOf and CondRefOf wrap the operand.
        let reference = Arc::new(Object::Reference { kind: ReferenceKind::RefOf, inner: src });
        context.cur_op().items.push(Item::Obj(reference));
        Ok(())
    }

    fn handle_copy_object_or_store(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let (src, dst) = {
            let items = &context.cur_op_ref().items;
            (items[0].obj().clone(), items[1].obj().clone())
        };

        if context.cur_op_ref().code == STORE_OP {
            return self.store_to_target(&dst, &src);
        }

        if !matches!(&*dst, Object::Reference { .. }) {
            return Err(AmlError::BadBytecode);
        }
        self.copy_object_to_reference(&dst, &src)
    }

    fn handle_index(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let (src, idx) = {
            let items = &context.cur_op_ref().items;
            (items[0].obj().clone(), items[1].obj().as_integer()? as usize)
        };

        let result = match &*src {
            Object::Buffer(data) => {
                ensure_valid_idx(idx, data.len())?;
                Arc::new(Object::BufferIndex { backing: src.clone(), idx })
            }
            Object::String { data, .. } => {
                ensure_valid_idx(idx, data.len())?;
                Arc::new(Object::BufferIndex { backing: src.clone(), idx })
            }
            Object::Package(elements) => {
                ensure_valid_idx(idx, elements.len())?;

                /*
                 * Lazily lift the element into a PkgIndex reference to
                 * itself. CopyObject against the index must reach the
                 * original slot, and anyone holding an older index object
                 * must observe the new value. IndexOp is not a SimpleName,
                 * so a CopyObject to it is technically illegal, but the NT
                 * driver allows it just fine.
                 */
                let slot = elements[idx].clone();
                if matches!(&*slot, Object::Reference { kind: ReferenceKind::PkgIndex, .. }) {
                    slot
                } else {
                    let lifted = Arc::new(Object::Reference {
                        kind: ReferenceKind::PkgIndex,
                        inner: slot,
                    });
                    let Object::Package(elements) = src.gain_mut() else { panic!() };
                    elements[idx] = lifted.clone();
                    lifted
                }
            }
            _ => {
                warn!(
                    "Invalid argument for Index: {}, expected String/Buffer/Package",
                    src.type_name()
                );
                return Err(AmlError::BadBytecode);
            }
        };

        context.cur_op().items.push(Item::Obj(result));
        Ok(())
    }

    fn handle_mid(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let (src, idx, length) = {
            let items = &context.cur_op_ref().items;
            (
                items[0].obj().clone(),
                items[1].obj().as_integer()? as usize,
                items[2].obj().as_integer()? as usize,
            )
        };

        let (bytes, is_string) = match &*src {
            Object::String { data, .. } => (data.clone(), true),
            Object::Buffer(data) => (data.clone(), false),
            _ => {
                warn!("Invalid argument for Mid: {}, expected String/Buffer", src.type_name());
                return Err(AmlError::BadBytecode);
            }
        };

        let data = if bytes.is_empty() || idx >= bytes.len() {
            Vec::new()
        } else {
            let length = usize::min(length, bytes.len() - idx);
            bytes[idx..idx + length].to_vec()
        };

        let result = if is_string {
            Object::String { data, kind: StringKind::Normal }
        } else {
            Object::Buffer(data)
        };
        context.cur_op().items.push(Item::Obj(Arc::new(result)));
        Ok(())
    }

    fn handle_concatenate(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let (lhs, rhs) = {
            let items = &context.cur_op_ref().items;
            (items[0].obj().clone(), items[1].obj().clone())
        };

        let result = match &*lhs {
            Object::Integer(lhs) => {
                let int_size = self.sizeof_int();
                let rhs = rhs.to_integer(8);
                let mut data = Vec::with_capacity(int_size * 2);
                data.extend_from_slice(&lhs.to_le_bytes()[..int_size]);
                data.extend_from_slice(&rhs.to_le_bytes()[..int_size]);
                Object::Buffer(data)
            }
            Object::Buffer(lhs) => {
                let mut data = lhs.clone();
                data.extend_from_slice(&rhs.storage_bytes(self.sizeof_int(), true)?);
                Object::Buffer(data)
            }
            Object::String { data: lhs, .. } => {
                let rhs_bytes = match &*rhs {
                    Object::Integer(value) => format!("{:x}", value).into_bytes(),
                    Object::String { data, .. } => data.clone(),
                    // NT doesn't support this, so we don't as well.
                    _ => return Err(AmlError::InvalidArgument),
                };
                let mut data = lhs.clone();
                data.extend_from_slice(&rhs_bytes);
                Object::String { data, kind: StringKind::Normal }
            }
            _ => return Err(AmlError::InvalidArgument),
        };

        context.cur_op().items.push(Item::Obj(Arc::new(result)));
        Ok(())
    }

    fn handle_to(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let op = context.cur_op_ref().code;
        let src = context.cur_op_ref().items[0].obj().clone();

        let result = match op {
            // NT always takes the first 8 bytes, even for revision 1.
            TO_INTEGER_OP => Object::Integer(src.to_integer(8)),
            TO_HEX_STRING_OP | TO_DECIMAL_STRING_OP => {
                let is_hex = op == TO_HEX_STRING_OP;
                match &*src {
                    Object::Integer(value) => Object::String {
                        data: integer_to_string(*value, is_hex),
                        kind: StringKind::Normal,
                    },
                    Object::Buffer(data) => Object::String {
                        data: buffer_to_string(data, is_hex),
                        kind: StringKind::Normal,
                    },
                    // String-to-string conversion copies the storage through.
                    _ => Object::String {
                        data: src.storage_bytes(self.sizeof_int(), false)?,
                        kind: StringKind::Normal,
                    },
                }
            }
            TO_BUFFER_OP => Object::Buffer(src.storage_bytes(self.sizeof_int(), true)?),
            _ => return Err(AmlError::InvalidArgument),
        };

        context.cur_op().items.push(Item::Obj(Arc::new(result)));
        Ok(())
    }

    fn handle_to_string(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let (src, req_length) = {
            let items = &context.cur_op_ref().items;
            (items[0].obj().clone(), items[1].obj().as_integer()? as usize)
        };
        let Object::Buffer(data) = &*src else { panic!() };

        let length = usize::min(req_length, data.len());
        // Stop short at an embedded NUL.
        let length = data[..length].iter().position(|byte| *byte == 0x00).unwrap_or(length);

        let result = Object::String { data: data[..length].to_vec(), kind: StringKind::Normal };
        context.cur_op().items.push(Item::Obj(Arc::new(result)));
        Ok(())
    }

    fn handle_named_object(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let node = context.cur_op_ref().items[0].node();
        let object = self.namespace.lock().object_of(node).ok_or(AmlError::InvalidArgument)?;
        context.cur_op().items.push(Item::Obj(object));
        Ok(())
    }

    fn handle_field_read(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let as_buffer = context.cur_op_ref().code == INTERNAL_FIELD_READ_AS_BUFFER_OP;
        let node = context.cur_op_ref().items[0].node();
        let object = self.namespace.lock().object_of(node).ok_or(AmlError::InvalidArgument)?;
        let object = object.unwrap_transparent_reference();
        let Object::BufferField(field) = &*object else { return Err(AmlError::InvalidArgument) };

        let result = if as_buffer {
            let mut data = vec![0; field.byte_size()];
            field.read(&mut data);
            Object::Buffer(data)
        } else {
            let mut bytes = [0u8; 8];
            field.read(&mut bytes[..field.byte_size()]);
            Object::Integer(u64::from_le_bytes(bytes))
        };

        context.cur_op().items.push(Item::Obj(Arc::new(result)));
        Ok(())
    }

    fn handle_buffer(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let (pkg, declared_size, aml_offset) = {
            let items = &context.cur_op_ref().items;
            (items[0].pkg(), items[1].obj().as_integer()?, items[2].imm() as usize)
        };

        let method = context.cur_frame().method.clone();
        let code = method_code(&method);

        // TODO: do package bounds checking at parse time
        if pkg.end > code.len() || aml_offset > pkg.end {
            return Err(AmlError::BadBytecode);
        }

        if declared_size > 0xE000_0000 {
            warn!("buffer is too large ({}), assuming corrupted bytestream", declared_size);
            return Err(AmlError::BadBytecode);
        }
        if declared_size == 0 {
            warn!("attempted to create an empty buffer");
            return Err(AmlError::BadBytecode);
        }

        let declared_size = declared_size as usize;
        let init = &code[aml_offset..pkg.end];
        if init.len() > declared_size {
            warn!("too many buffer initializers: {} (size is {})", init.len(), declared_size);
        }
        let init_size = usize::min(init.len(), declared_size);

        let mut data = vec![0; declared_size];
        data[..init_size].copy_from_slice(&init[..init_size]);

        context.cur_op().items.push(Item::Obj(Arc::new(Object::Buffer(data))));
        Ok(())
    }

    fn handle_package(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        /*
         * Layout of items here:
         * [0] -> Package length
         * [1] -> Immediate or integer object, depending on Package/VarPackage
         * [2..] -> AML pc + package element pairs
         */
        let num_elements = if context.cur_op_ref().code == VAR_PACKAGE_OP {
            let declared = context.cur_op_ref().items[1].obj().as_integer()?;
            if declared > 0xE000_0000 {
                warn!("package is too large ({}), assuming corrupted bytestream", declared);
                return Err(AmlError::BadBytecode);
            }
            declared as usize
        } else {
            context.cur_op_ref().items[1].imm() as usize
        };

        let mut num_defined = (context.cur_op_ref().items.len() - 2) / 2;
        if num_defined > num_elements {
            warn!("too many package initializers: {}, truncating to {}", num_defined, num_elements);
            num_defined = num_elements;
        }

        let method = context.cur_frame().method.clone();
        let code = method_code(&method);

        let mut elements = Vec::with_capacity(num_elements);
        for i in 0..num_defined {
            let items = &context.cur_op_ref().items;
            let aml_pc = items[2 + 2 * i].imm() as usize;
            let slot = &items[2 + 2 * i + 1];

            /*
             * Named objects are recorded as the path to them, not the object:
             * packages routinely reference names that are only defined later,
             * and NT resolves them when the package is consumed.
             */
            let element = match slot {
                Item::EmptySlot => lazy_path_element(code, aml_pc)?,
                Item::Obj(obj) => match &**obj {
                    Object::Reference { kind: ReferenceKind::Named, .. } => {
                        lazy_path_element(code, aml_pc)?
                    }
                    Object::Reference { .. } => {
                        let value = obj.clone().unwrap_transparent_reference();
                        Arc::new(value.clone_with(AssignBehavior::Deep))
                    }
                    _ => Arc::new(obj.clone_with(AssignBehavior::Deep)),
                },
                _ => panic!(),
            };
            elements.push(element);
        }
        for _ in num_defined..num_elements {
            elements.push(Arc::new(Object::Uninitialized));
        }

        context.cur_op().items.push(Item::Obj(Arc::new(Object::Package(elements))));
        Ok(())
    }

    fn handle_create_named(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let (node, src) = {
            let items = &context.cur_op_ref().items;
            (items[0].node(), items[1].obj().clone())
        };
        self.namespace.lock().set_object(
            node,
            Arc::new(Object::Reference { kind: ReferenceKind::Named, inner: src }),
        );
        Ok(())
    }

    fn handle_create_alias(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let (src, dst) = {
            let items = &context.cur_op_ref().items;
            (items[0].node(), items[1].node())
        };
        let mut namespace = self.namespace.lock();
        let object = namespace.object_of(src).ok_or(AmlError::InvalidArgument)?;
        namespace.set_object(dst, object);
        Ok(())
    }

    fn handle_create_op_region(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let (node, space, offset, length) = {
            let items = &context.cur_op_ref().items;
            (
                items[0].node(),
                items[1].imm() as u8,
                items[2].obj().as_integer()?,
                items[3].obj().as_integer()?,
            )
        };
        self.namespace.lock().set_object(
            node,
            Arc::new(Object::OpRegion(OpRegion {
                space: RegionSpace::from(space),
                offset,
                length,
            })),
        );
        Ok(())
    }

    /// The real field mechanism in this core is buffer fields; a `Field`'s
    /// unit list is parsed past and dropped.
    fn handle_create_field(&self, _context: &mut ExecutionContext) -> Result<(), AmlError> {
        Ok(())
    }

    fn handle_create_mutex(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let (node, flags) = {
            let items = &context.cur_op_ref().items;
            (items[0].node(), items[1].imm() as u8)
        };
        // Bits 0-3: SyncLevel, bits 4-7: reserved, must be 0.
        let mutex = Arc::new(Object::Mutex { sync_level: flags & 0b1111 });
        self.namespace.lock().set_object(
            node,
            Arc::new(Object::Reference { kind: ReferenceKind::Named, inner: mutex }),
        );
        Ok(())
    }

    fn handle_create_method(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let (pkg, node, flags, body_begin) = {
            let items = &context.cur_op_ref().items;
            (items[0].pkg(), items[1].node(), items[2].imm() as u8, items[3].imm() as usize)
        };

        let method = context.cur_frame().method.clone();
        let code = method_code(&method);
        if pkg.end > code.len() || body_begin > pkg.end {
            return Err(AmlError::BadBytecode);
        }

        let method = Arc::new(Object::Method {
            code: code[body_begin..pkg.end].to_vec(),
            flags: MethodFlags(flags),
            named_objects_persist: false,
        });
        self.namespace.lock().set_object(
            node,
            Arc::new(Object::Reference { kind: ReferenceKind::Named, inner: method }),
        );
        Ok(())
    }

    fn handle_create_buffer_field(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let op = context.cur_op_ref().code;

        /*
         * Layout of items here:
         * [0] -> Type checked source buffer object
         * [1] -> Byte/bit index integer object
         * [2] (  if     CreateField) -> bit length integer object
         * [3] (2 if not CreateField) -> the new namespace node
         */
        let (backing, node, bit_index, bit_length, force_buffer) = {
            let items = &context.cur_op_ref().items;
            let backing = items[0].obj().clone();
            let index = items[1].obj().as_integer()? as usize;

            if op == CREATE_FIELD_OP {
                let length = items[2].obj().as_integer()?;
                if length == 0 || length > 0xFFFF_FFFF {
                    warn!("invalid bit field length ({})", length);
                    return Err(AmlError::BadBytecode);
                }
                (backing, items[3].node(), index, length as usize, true)
            } else {
                let length = match op {
                    CREATE_BIT_FIELD_OP => 1,
                    CREATE_BYTE_FIELD_OP => 8,
                    CREATE_WORD_FIELD_OP => 16,
                    CREATE_DWORD_FIELD_OP => 32,
                    CREATE_QWORD_FIELD_OP => 64,
                    _ => return Err(AmlError::InvalidArgument),
                };
                let bit_index = if op == CREATE_BIT_FIELD_OP { index } else { index * 8 };
                (backing, items[2].node(), bit_index, length, false)
            }
        };

        let backing_size = {
            let Object::Buffer(data) = &*backing else { panic!() };
            data.len()
        };
        if bit_index + bit_length > backing_size * 8 {
            warn!(
                "Invalid buffer field: bits [{}..{}], buffer size is {} bytes",
                bit_index,
                bit_index + bit_length,
                backing_size
            );
            return Err(AmlError::BadBytecode);
        }

        let field = Arc::new(Object::BufferField(BufferField {
            backing,
            bit_index,
            bit_length,
            force_buffer,
        }));
        self.namespace.lock().set_object(
            node,
            Arc::new(Object::Reference { kind: ReferenceKind::Named, inner: field }),
        );
        Ok(())
    }

    fn handle_code_block(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let op = context.cur_op_ref().code;

        let skip_block = match op {
            ELSE_OP => context.skip_else,
            DEVICE_OP | PROCESSOR_OP | POWER_RES_OP | THERMAL_ZONE_OP => {
                self.create_named_scope(context)?;
                false
            }
            SCOPE_OP => false,
            IF_OP | WHILE_OP => context.cur_op_ref().items[1].obj().as_integer()? == 0,
            _ => return Err(AmlError::InvalidArgument),
        };

        let pkg = context.cur_op_ref().items[0].pkg();
        if skip_block {
            context.cur_frame_mut().code_offset = pkg.end;
            return Ok(());
        }

        self.begin_block_execution(context)
    }

    fn create_named_scope(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let op = context.cur_op_ref().code;
        let items = &context.cur_op_ref().items;
        let node = items[1].node();

        let object = match op {
            DEVICE_OP => Object::Device,
            THERMAL_ZONE_OP => Object::ThermalZone,
            PROCESSOR_OP => Object::Processor {
                id: items[2].imm() as u8,
                block_address: items[3].imm() as u32,
                block_length: items[4].imm() as u8,
            },
            POWER_RES_OP => Object::PowerResource {
                system_level: items[2].imm() as u8,
                resource_order: items[3].imm() as u16,
            },
            _ => return Err(AmlError::InvalidArgument),
        };

        self.namespace.lock().set_object(
            node,
            Arc::new(Object::Reference { kind: ReferenceKind::Named, inner: Arc::new(object) }),
        );
        Ok(())
    }

    fn begin_block_execution(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let op = context.cur_op_ref().code;
        let kind = match op {
            IF_OP => BlockKind::If,
            ELSE_OP => BlockKind::Else,
            WHILE_OP => BlockKind::While,
            SCOPE_OP | DEVICE_OP | PROCESSOR_OP | POWER_RES_OP | THERMAL_ZONE_OP => {
                BlockKind::Scope
            }
            _ => return Err(AmlError::InvalidArgument),
        };

        let pkg = context.cur_op_ref().items[0].pkg();
        let node = if kind == BlockKind::Scope {
            Some(context.cur_op_ref().items[1].node())
        } else {
            None
        };

        let frame = context.cur_frame_mut();
        // -1 so a While re-evaluates from the start of its op next time round.
        frame.code_blocks.push(CodeBlock { kind, begin: pkg.begin - 1, end: pkg.end, node });
        if kind == BlockKind::Scope {
            frame.cur_scope = node.unwrap();
        }
        Ok(())
    }

    fn handle_control_flow(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let is_break = context.cur_op_ref().code == BREAK_OP;
        loop {
            let frame = context.cur_frame_mut();
            let Some(block) = frame.code_blocks.last() else {
                return Err(if is_break {
                    AmlError::BreakOutsideOfWhile
                } else {
                    AmlError::ContinueOutsideOfWhile
                });
            };

            if block.kind != BlockKind::While {
                let kind = block.kind;
                frame.code_blocks.pop();
                if kind == BlockKind::Scope {
                    self.update_scope(context.cur_frame_mut());
                }
                continue;
            }

            frame.code_offset = if is_break { block.end } else { block.begin };
            frame.code_blocks.pop();
            return Ok(());
        }
    }

    fn handle_return(&self, context: &mut ExecutionContext) -> Result<(), AmlError> {
        let ret_value = context.cur_op_ref().items[0].obj().clone();
        {
            let frame = context.cur_frame_mut();
            let method = frame.method.clone();
            frame.code_offset = method_code(&method).len();
        }

        let depth = context.call_stack.len();
        if depth > 1 {
            let prev_frame = &context.call_stack[depth - 2];
            let Some(op_context) = prev_frame.pending_ops.last() else {
                // No one wants the return value at the call site. Discard it.
                return Ok(());
            };
            let slot = op_context.items.last().unwrap().obj().clone();
            let slot = slot.unwrap_transparent_reference();
            slot.assign(&ret_value, AssignBehavior::Deep);
        } else {
            context.ret.assign(&ret_value, AssignBehavior::Deep);
        }
        Ok(())
    }

    /*
     * The store/copy protocol. Store applies the NT implicit-cast rules,
     * CopyObject replaces the destination outright; both dispatch on the
     * reference kind of the target.
     */
    fn store_to_target(&self, dst: &Arc<Object>, src: &Arc<Object>) -> Result<(), AmlError> {
        match &**dst {
            Object::Debug => self.debug_store(src),
            Object::Reference { .. } => self.store_to_reference(dst, src),
            Object::BufferIndex { .. } => self.assign_with_implicit_cast(dst, src),
            // A NULL target.
            Object::Integer(0) => Ok(()),
            _ => Err(AmlError::BadBytecode),
        }
    }

    /*
     * if Store(..., Obj) where Obj is:
     * 1. LocalX/Index -> OVERWRITE unless the object is a reference, in that
     *                    case store to the referenced object _with_ implicit
     *                    cast.
     * 2. ArgX -> OVERWRITE unless the object is a reference, in that
     *            case OVERWRITE the referenced object.
     * 3. NAME -> Store with implicit cast.
     * 4. RefOf -> Not allowed here.
     */
    fn store_to_reference(&self, dst: &Arc<Object>, src: &Arc<Object>) -> Result<(), AmlError> {
        let Object::Reference { kind, inner } = &**dst else { panic!() };

        let mut overwrite = false;
        let target = match kind {
            ReferenceKind::Local | ReferenceKind::Arg | ReferenceKind::PkgIndex => {
                let referenced = inner.clone();
                if matches!(&*referenced, Object::Reference { .. }) {
                    overwrite = *kind == ReferenceKind::Arg;
                    referenced.bottom_reference()
                } else {
                    overwrite = true;
                    dst.clone()
                }
            }
            ReferenceKind::Named => dst.clone().bottom_reference(),
            ReferenceKind::RefOf => return Err(AmlError::InvalidArgument),
        };

        let src_obj = src.clone().unwrap_transparent_reference();
        let Object::Reference { inner: target_inner, .. } = &*target else { panic!() };
        overwrite |= matches!(&**target_inner, Object::Uninitialized);

        if overwrite {
            let new = Arc::new(src_obj.clone_with(AssignBehavior::Deep));
            object_replace_child(&target, new);
            return Ok(());
        }

        self.assign_with_implicit_cast(target_inner, &src_obj)
    }

    /*
     * CopyObject(..., Obj) where Obj is:
     * 1. LocalX -> Overwrite LocalX.
     * 2. NAME -> Overwrite NAME.
     * 3. ArgX -> Overwrite ArgX unless ArgX is a reference, in that case
     *            overwrite the referenced object.
     * 4. RefOf -> Not allowed here.
     * 5. Index -> Overwrite Object stored at the index.
     */
    fn copy_object_to_reference(&self, dst: &Arc<Object>, src: &Arc<Object>) -> Result<(), AmlError> {
        let Object::Reference { kind, inner } = &**dst else { panic!() };

        let target = match kind {
            ReferenceKind::Arg => {
                let referenced = inner.clone();
                if matches!(&*referenced, Object::Reference { .. }) {
                    referenced.bottom_reference()
                } else {
                    dst.clone()
                }
            }
            ReferenceKind::Local | ReferenceKind::PkgIndex | ReferenceKind::Named => dst.clone(),
            ReferenceKind::RefOf => return Err(AmlError::InvalidArgument),
        };

        let src_obj = src.clone().unwrap_transparent_reference();
        object_replace_child(&target, Arc::new(src_obj.clone_with(AssignBehavior::Deep)));
        Ok(())
    }

    /// The "implicit cast" of the specification; in reality we just copy one
    /// storage to another because that's what NT does.
    fn assign_with_implicit_cast(
        &self,
        dst: &Arc<Object>,
        src: &Arc<Object>,
    ) -> Result<(), AmlError> {
        let src_bytes = src.storage_bytes(self.sizeof_int(), false)?;

        match dst.gain_mut() {
            Object::Integer(value) => {
                let mut bytes = value.to_le_bytes();
                let int_size = self.sizeof_int();
                copy_zero_extended(&mut bytes[..int_size], &src_bytes);
                *value = u64::from_le_bytes(bytes);
            }
            Object::String { data, .. } => copy_zero_extended(data, &src_bytes),
            Object::Buffer(data) => copy_zero_extended(data, &src_bytes),
            Object::BufferField(field) => field.write(&src_bytes),
            Object::BufferIndex { backing, idx } => buffer_index_write(backing, *idx, &src_bytes),
            _ => return Err(AmlError::BadBytecode),
        }
        Ok(())
    }

    fn debug_store(&self, src: &Arc<Object>) -> Result<(), AmlError> {
        let src = src.clone().unwrap_transparent_reference();

        self.debug_store_no_recurse("[AML DEBUG]", &src);
        if let Object::Package(elements) = &*src {
            for element in elements {
                let element = match &**element {
                    Object::Reference { kind: ReferenceKind::PkgIndex, inner } => inner.clone(),
                    _ => element.clone(),
                };
                self.debug_store_no_recurse("Element:", &element);
            }
        }

        self.handler.handle_debug(&src);
        Ok(())
    }

    fn debug_store_no_recurse(&self, prefix: &str, src: &Arc<Object>) {
        match &**src {
            Object::Uninitialized => info!("{} Uninitialized", prefix),
            Object::String { data, .. } => {
                info!("{} String => \"{}\"", prefix, String::from_utf8_lossy(data))
            }
            Object::Integer(value) => {
                if self.is_rev1() {
                    info!("{} Integer => 0x{:08X}", prefix, value);
                } else {
                    info!("{} Integer => 0x{:016X}", prefix, value);
                }
            }
            Object::Reference { kind, .. } => info!("{} Reference ({:?})", prefix, kind),
            Object::Package(elements) => info!("{} Package ({} elements)", prefix, elements.len()),
            Object::Buffer(data) => info!("{} Buffer ({} bytes)", prefix, data.len()),
            Object::OpRegion(region) => info!(
                "{} OperationRegion (ASID {:?}) 0x{:016X} -> 0x{:016X}",
                prefix,
                region.space,
                region.offset,
                region.offset + region.length
            ),
            Object::PowerResource { system_level, resource_order } => {
                info!("{} Power Resource {} {}", prefix, system_level, resource_order)
            }
            Object::Processor { id, block_address, block_length } => {
                info!("{} Processor[{}] 0x{:08X} ({})", prefix, id, block_address, block_length)
            }
            Object::BufferIndex { backing, idx } => info!(
                "{} Buffer Index [{}] => 0x{:02X}",
                prefix,
                idx,
                buffer_index_read(backing, *idx)
            ),
            Object::Mutex { sync_level } => info!("{} Mutex sync level {}", prefix, sync_level),
            _ => info!("{} {}", prefix, src.type_name()),
        }
    }
}

/// The interface from the interpreter to the hosting kernel.
pub trait Handler: Send + Sync {
    /// Returns a monotonically-increasing value of nanoseconds, read by the
    /// `Timer` opcode in 100ns units.
    fn nanos_since_boot(&self) -> u64;

    fn breakpoint(&self) {}

    fn handle_debug(&self, _object: &Object) {}
}

#[derive(Clone, PartialEq, Debug)]
pub enum AmlError {
    RunOutOfStream,
    IllegalOpcode(u16),
    BadBytecode,
    InvalidNameSeg([u8; 4]),
    ObjectNotFound,
    ObjectAlreadyExists,
    InvalidArgument,
    Unimplemented,
    MethodArgCountIncorrect,
    ObjectNotOfExpectedType { expected: ObjectType, got: ObjectType },
    BreakOutsideOfWhile,
    ContinueOutsideOfWhile,
}

/*
 * One method invocation (or table load). `pending_ops` is the stack of
 * opcodes currently being decoded; `code_blocks` the stack of If/Else/While/
 * Scope regions the cursor sits inside.
 */
struct CallFrame {
    method: Arc<Object>,
    args: [Option<Arc<Object>>; 7],
    locals: [Option<Arc<Object>>; 8],
    pending_ops: Vec<OpContext>,
    code_blocks: Vec<CodeBlock>,
    /// Nodes to uninstall (in reverse) when the frame retires, for methods
    /// whose named objects do not persist.
    temp_nodes: Vec<NodeId>,
    cur_scope: NodeId,
    code_offset: usize,
}

impl CallFrame {
    fn new(
        method: Arc<Object>,
        args: Vec<Arc<Object>>,
        scope: NodeId,
        code_len: usize,
    ) -> CallFrame {
        let mut arg_slots: [Option<Arc<Object>>; 7] = Default::default();
        for (i, arg) in args.into_iter().enumerate() {
            arg_slots[i] =
                Some(Arc::new(Object::Reference { kind: ReferenceKind::Arg, inner: arg }));
        }

        CallFrame {
            method,
            args: arg_slots,
            locals: Default::default(),
            pending_ops: Vec::new(),
            code_blocks: vec![CodeBlock {
                kind: BlockKind::Scope,
                begin: 0,
                end: code_len,
                node: Some(scope),
            }],
            temp_nodes: Vec::new(),
            cur_scope: scope,
            code_offset: 0,
        }
    }

    fn has_code(&self) -> bool {
        let Object::Method { code, .. } = &*self.method else { panic!() };
        self.code_offset < code.len()
    }
}

/// One opcode in the middle of decoding. `pc` indexes into the opcode's
/// parse program; `items` collects decoded operands, package lengths,
/// immediates and namespace nodes.
struct OpContext {
    spec: &'static OpSpec,
    code: u16,
    pc: usize,
    preempted: bool,
    tracked_pkg_idx: Option<usize>,
    items: Vec<Item>,
}

impl OpContext {
    fn new(spec: &'static OpSpec, code: u16) -> OpContext {
        OpContext { spec, code, pc: 0, preempted: false, tracked_pkg_idx: None, items: Vec::new() }
    }

    fn next_program_byte(&mut self) -> u8 {
        let byte = self.spec.ops[self.pc];
        self.pc += 1;
        byte
    }
}

#[derive(Debug)]
enum Item {
    Node(Option<NodeId>),
    /// A node allocated by this op but not yet installed; freed on unwind.
    MethodLocalNode(Option<NodeId>),
    Obj(Arc<Object>),
    /// A slot waiting for a dynamic argument's result.
    EmptySlot,
    Pkg(PackageLength),
    Imm(u64),
}

impl Item {
    fn obj(&self) -> &Arc<Object> {
        let Item::Obj(obj) = self else { panic!() };
        obj
    }

    fn node(&self) -> NodeId {
        match self {
            Item::Node(Some(node)) | Item::MethodLocalNode(Some(node)) => *node,
            _ => panic!(),
        }
    }

    fn imm(&self) -> u64 {
        let Item::Imm(value) = self else { panic!() };
        *value
    }

    fn pkg(&self) -> PackageLength {
        let Item::Pkg(pkg) = self else { panic!() };
        *pkg
    }

    fn is_null(&self) -> bool {
        matches!(self, Item::EmptySlot | Item::Node(None) | Item::MethodLocalNode(None))
    }
}

#[derive(Clone, Copy, Debug)]
struct PackageLength {
    begin: usize,
    end: usize,
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum BlockKind {
    If,
    Else,
    While,
    Scope,
}

struct CodeBlock {
    kind: BlockKind,
    begin: usize,
    end: usize,
    node: Option<NodeId>,
}

struct ExecutionContext {
    call_stack: Vec<CallFrame>,
    ret: Arc<Object>,
    skip_else: bool,
}

impl ExecutionContext {
    fn cur_frame(&self) -> &CallFrame {
        self.call_stack.last().unwrap()
    }

    fn cur_frame_mut(&mut self) -> &mut CallFrame {
        self.call_stack.last_mut().unwrap()
    }

    fn cur_op(&mut self) -> &mut OpContext {
        self.cur_frame_mut().pending_ops.last_mut().unwrap()
    }

    fn cur_op_ref(&self) -> &OpContext {
        self.cur_frame().pending_ops.last().unwrap()
    }

    fn cur_and_prev_ops(&mut self) -> (&mut OpContext, Option<&mut OpContext>) {
        let ops = &mut self.call_stack.last_mut().unwrap().pending_ops;
        let len = ops.len();
        if len < 2 {
            (ops.last_mut().unwrap(), None)
        } else {
            let (head, tail) = ops.split_at_mut(len - 1);
            (&mut tail[0], Some(&mut head[len - 2]))
        }
    }

    fn has_non_preempted_op(&self) -> bool {
        match self.call_stack.last() {
            Some(frame) => frame.pending_ops.last().map(|op| !op.preempted).unwrap_or(false),
            None => false,
        }
    }

    /// The parse op the preempted parent is waiting at, if there is one.
    fn prev_parse_op(&self) -> Option<ParseOp> {
        let frame = self.call_stack.last()?;
        let len = frame.pending_ops.len();
        if len < 2 {
            return None;
        }
        let prev = &frame.pending_ops[len - 2];
        ParseOp::from_byte(prev.spec.ops[prev.pc])
    }
}

fn method_code(method: &Arc<Object>) -> &[u8] {
    let Object::Method { code, .. } = &**method else { panic!() };
    code
}

fn object_replace_child(parent: &Arc<Object>, new_child: Arc<Object>) {
    let Object::Reference { inner, .. } = parent.gain_mut() else { panic!() };
    *inner = new_child;
}

/*
 * Object implicit dereferencing [Store(..., obj)/Increment(obj), ...]:
 * RefOf -> the bottom-most referenced object
 * LocalX/ArgX -> object stored at LocalX if LocalX is not a reference,
 *                otherwise the bottom-most referenced object.
 * NAME -> object stored at NAME
 */
fn object_deref_implicit(obj: &Arc<Object>) -> Arc<Object> {
    let Object::Reference { kind, inner } = &**obj else { return obj.clone() };

    match kind {
        ReferenceKind::RefOf => obj.clone().unwrap_reference(),
        ReferenceKind::Named => inner.clone(),
        _ => {
            if matches!(&**inner, Object::Reference { .. }) {
                inner.clone().unwrap_reference()
            } else {
                inner.clone()
            }
        }
    }
}

fn ensure_valid_idx(idx: usize, len: usize) -> Result<(), AmlError> {
    if idx < len {
        Ok(())
    } else {
        warn!("Invalid index {}, object has {} elements", idx, len);
        Err(AmlError::BadBytecode)
    }
}

fn parse_op_wants_supername(op: ParseOp) -> bool {
    matches!(
        op,
        ParseOp::SimpleName
            | ParseOp::Supername
            | ParseOp::SupernameImplicitDeref
            | ParseOp::SupernameOrUnresolved
            | ParseOp::Target
    )
}

fn parse_op_wants_term_arg(op: ParseOp) -> bool {
    matches!(
        op,
        ParseOp::TermArg
            | ParseOp::TermArgUnwrapInternal
            | ParseOp::Operand
            | ParseOp::ComputationalData
    )
}

fn parse_op_allows_unresolved(op: ParseOp) -> bool {
    matches!(
        op,
        ParseOp::SupernameOrUnresolved
            | ParseOp::TermArgOrNamedObjectOrUnresolved
            | ParseOp::ExistingNamestringOrNull
    )
}

fn op_typecheck(prev: ParseOp, spec: &OpSpec) -> Result<(), AmlError> {
    let (expected, ok_mask) = match prev {
        ParseOp::SimpleName => ("SimpleName := NameString | ArgObj | LocalObj", PROP_SIMPLE_NAME),
        ParseOp::Target => ("Target := SuperName | NullName", PROP_TARGET | PROP_SUPER_NAME),
        ParseOp::Supername | ParseOp::SupernameImplicitDeref | ParseOp::SupernameOrUnresolved => {
            ("SuperName := SimpleName | DebugObj | ReferenceTypeOpcode", PROP_SUPER_NAME)
        }
        ParseOp::TermArg
        | ParseOp::TermArgUnwrapInternal
        | ParseOp::TermArgOrNamedObject
        | ParseOp::TermArgOrNamedObjectOrUnresolved
        | ParseOp::Operand
        | ParseOp::ComputationalData => {
            ("TermArg := ExpressionOpcode | DataObject | ArgObj | LocalObj", PROP_TERM_ARG)
        }
        _ => return Ok(()),
    };

    if spec.properties & ok_mask == 0 {
        warn!("invalid argument: '{}', expected a {}", spec.name, expected);
        return Err(AmlError::BadBytecode);
    }
    Ok(())
}

fn typecheck_operand(obj: &Arc<Object>) -> Result<(), AmlError> {
    if matches!(&**obj, Object::Integer(_)) {
        return Ok(());
    }
    warn!("invalid argument type: {}, expected an Operand (TermArg => Integer)", obj.type_name());
    Err(AmlError::BadBytecode)
}

fn typecheck_computational_data(obj: &Arc<Object>) -> Result<(), AmlError> {
    match &**obj {
        Object::Integer(_) | Object::String { .. } | Object::Buffer(_) => Ok(()),
        _ => {
            warn!(
                "invalid argument type: {}, expected ComputationalData (ByteConst | WordConst \
                 | DWordConst | QWordConst | String | ConstObj | RevisionOp | DefBuffer)",
                obj.type_name()
            );
            Err(AmlError::BadBytecode)
        }
    }
}

/*
 * PkgLength :=
 *   PkgLeadByte |
 *   <pkgleadbyte bytedata> |
 *   <pkgleadbyte bytedata bytedata> | <pkgleadbyte bytedata bytedata bytedata>
 * PkgLeadByte :=
 *   <bit 7-6: bytedata count that follows (0-3)>
 *   <bit 5-4: only used if pkglength < 63>
 *   <bit 3-0: least significant package length nybble>
 */
fn parse_package_length(frame: &mut CallFrame) -> Result<PackageLength, AmlError> {
    let method = frame.method.clone();
    let code = method_code(&method);

    let begin = frame.code_offset;
    if begin >= code.len() {
        return Err(AmlError::BadBytecode);
    }

    let lead = code[begin];
    let marker_length = 1 + (lead >> 6) as usize;
    if code.len() - begin < marker_length {
        return Err(AmlError::BadBytecode);
    }

    let size = if marker_length == 1 {
        (lead & 0b11_1111) as usize
    } else {
        let mut size = (lead & 0b1111) as usize;
        for i in 1..marker_length {
            size |= (code[begin + i] as usize) << (4 + (i - 1) * 8);
        }
        size
    };

    frame.code_offset += marker_length;
    Ok(PackageLength { begin, end: begin + size })
}

#[derive(Clone, Copy, PartialEq)]
enum ResolveBehavior {
    /// Walk all but the final segment; the final segment must not exist yet
    /// and is allocated (but not installed).
    CreateLastSeg,
    /// Every segment must resolve. Single-segment paths search upward
    /// through the ancestors of the current scope.
    FindExisting,
}

/*
 * NameString := <RootChar NamePath> | <PrefixPath NamePath>
 * PrefixPath := Nothing | <'^' PrefixPath>
 * NamePath := NameSeg | DualNamePath | MultiNamePath | NullName
 * DualNamePath := DualNamePrefix NameSeg NameSeg
 * MultiNamePath := MultiNamePrefix SegCount NameSeg(SegCount)
 */
const NULL_NAME: u8 = 0x00;
const DUAL_NAME_PREFIX_BYTE: u8 = 0x2e;
const MULTI_NAME_PREFIX_BYTE: u8 = 0x2f;

fn resolve_name_string(
    frame: &mut CallFrame,
    namespace: &mut Namespace,
    behavior: ResolveBehavior,
) -> Result<NodeId, AmlError> {
    let method = frame.method.clone();
    let code = method_code(&method);
    let root = namespace.root();

    let mut offset = frame.code_offset;
    let mut cur_node = frame.cur_scope;
    let mut prev_char = 0u8;
    let mut just_one_nameseg = true;

    loop {
        if offset >= code.len() {
            return Err(AmlError::BadBytecode);
        }

        match code[offset] {
            b'\\' => {
                if prev_char == b'^' {
                    return Err(AmlError::BadBytecode);
                }
                cur_node = root;
            }
            b'^' => {
                // Tried to go behind root.
                if cur_node == root {
                    return Err(AmlError::BadBytecode);
                }
                cur_node = namespace.parent_of(cur_node).unwrap();
            }
            _ => {}
        }

        prev_char = code[offset];
        match prev_char {
            b'\\' | b'^' => {
                just_one_nameseg = false;
                offset += 1;
            }
            _ => {}
        }

        if prev_char != b'^' {
            break;
        }
    }

    // At least a NullName byte is expected here.
    if offset >= code.len() {
        return Err(AmlError::BadBytecode);
    }

    let mut namesegs: usize;
    match code[offset] {
        DUAL_NAME_PREFIX_BYTE => {
            offset += 1;
            namesegs = 2;
            just_one_nameseg = false;
        }
        MULTI_NAME_PREFIX_BYTE => {
            offset += 1;
            if offset >= code.len() {
                return Err(AmlError::BadBytecode);
            }
            namesegs = code[offset] as usize;
            offset += 1;
            just_one_nameseg = false;
        }
        NULL_NAME => {
            offset += 1;
            if behavior == ResolveBehavior::CreateLastSeg || just_one_nameseg {
                return Err(AmlError::BadBytecode);
            }
            frame.code_offset = offset;
            return Ok(cur_node);
        }
        _ => {
            // Might be an invalid byte, but assume a single nameseg for now;
            // segment parsing validates it below.
            namesegs = 1;
        }
    }

    if namesegs * 4 > code.len() - offset {
        return Err(AmlError::BadBytecode);
    }

    let mut result = Ok(());
    while namesegs > 0 {
        let name = NameSeg::from_bytes([
            code[offset],
            code[offset + 1],
            code[offset + 2],
            code[offset + 3],
        ])?;

        let parent = cur_node;
        let mut found = namespace.find(parent, name);

        match behavior {
            ResolveBehavior::CreateLastSeg => {
                if namesegs == 1 {
                    if found.is_some() {
                        return Err(AmlError::ObjectAlreadyExists);
                    }
                    // Create the node and link it to its parent, but don't
                    // install it yet.
                    found = Some(namespace.alloc(name, Some(parent)));
                }
            }
            ResolveBehavior::FindExisting => {
                if just_one_nameseg {
                    let mut search_parent = parent;
                    while found.is_none() && search_parent != root {
                        search_parent = namespace.parent_of(search_parent).unwrap();
                        found = namespace.find(search_parent, name);
                    }
                }
            }
        }

        offset += 4;
        namesegs -= 1;

        match found {
            Some(node) => cur_node = node,
            None => {
                result = Err(AmlError::ObjectNotFound);
                break;
            }
        }
    }

    // Step over whatever remains of the name even on a miss, so unresolved
    // names leave the cursor in the right place.
    offset += namesegs * 4;
    frame.code_offset = offset;
    result.map(|()| cur_node)
}

/// Render the name string at `offset` as a printable path, prefix characters
/// and dot-separated 4-character segments included.
fn name_string_to_path(code: &[u8], mut offset: usize) -> Result<Vec<u8>, AmlError> {
    let mut path = Vec::new();

    loop {
        if offset >= code.len() {
            return Err(AmlError::BadBytecode);
        }
        match code[offset] {
            b'^' => {
                path.push(b'^');
                offset += 1;
            }
            b'\\' => {
                path.push(b'\\');
                offset += 1;
                break;
            }
            _ => break,
        }
    }

    if offset >= code.len() {
        return Err(AmlError::BadBytecode);
    }

    let namesegs = match code[offset] {
        DUAL_NAME_PREFIX_BYTE => {
            offset += 1;
            2
        }
        MULTI_NAME_PREFIX_BYTE => {
            offset += 1;
            if offset >= code.len() {
                return Err(AmlError::BadBytecode);
            }
            let count = code[offset] as usize;
            offset += 1;
            count
        }
        NULL_NAME => 0,
        _ => 1,
    };

    if namesegs * 4 > code.len() - offset {
        return Err(AmlError::BadBytecode);
    }

    for i in 0..namesegs {
        if i > 0 {
            path.push(b'.');
        }
        path.extend_from_slice(&code[offset..offset + 4]);
        offset += 4;
    }

    Ok(path)
}

fn lazy_path_element(code: &[u8], offset: usize) -> Result<Arc<Object>, AmlError> {
    let path = name_string_to_path(code, offset)?;
    Ok(Arc::new(Object::String { data: path, kind: StringKind::Path }))
}

fn integer_to_string(value: u64, is_hex: bool) -> Vec<u8> {
    if is_hex { format!("0x{:X}", value).into_bytes() } else { format!("{}", value).into_bytes() }
}

/// Buffers render as comma-separated items: `0x0A,0x0B` or `10,11`.
fn buffer_to_string(data: &[u8], is_hex: bool) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        if is_hex {
            out.extend_from_slice(format!("0x{:02X}", byte).as_bytes());
        } else {
            out.extend_from_slice(format!("{}", byte).as_bytes());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestHandler;

    impl Handler for TestHandler {
        fn nanos_since_boot(&self) -> u64 {
            0
        }
    }

    fn run_method(
        interpreter: &Interpreter<TestHandler>,
        code: &[u8],
    ) -> Result<Arc<Object>, AmlError> {
        let root = interpreter.namespace.lock().root();
        let method = Arc::new(Object::Method {
            code: code.to_vec(),
            flags: MethodFlags(0),
            named_objects_persist: false,
        });
        interpreter.execute_method(root, method, Vec::new())
    }

    fn run(code: &[u8]) -> Result<Arc<Object>, AmlError> {
        run_method(&Interpreter::new(TestHandler, 2), code)
    }

    #[test]
    fn store_to_local_then_add() {
        // Store(5, Local0); Add(Local0, One, Local1); Return(Local1)
        let result = run(&[0x70, 0x0a, 0x05, 0x60, 0x72, 0x60, 0x01, 0x61, 0xa4, 0x61]).unwrap();
        assert_eq!(result.as_integer(), Ok(6));

        // ... and Local0 itself is untouched.
        let result = run(&[0x70, 0x0a, 0x05, 0x60, 0x72, 0x60, 0x01, 0x61, 0xa4, 0x60]).unwrap();
        assert_eq!(result.as_integer(), Ok(5));
    }

    #[test]
    fn nested_add() {
        // Add(0x0e, Add(1, 3, Local1), Local1); Return(Local1)
        let result =
            run(&[0x72, 0x0a, 0x0e, 0x72, 0x0a, 0x01, 0x0a, 0x03, 0x61, 0x61, 0xa4, 0x61]).unwrap();
        assert_eq!(result.as_integer(), Ok(0x12));
    }

    #[test]
    fn package_with_lazy_name() {
        // Return(Package(2) { \_SB, 0 })
        let result =
            run(&[0xa4, 0x12, 0x08, 0x02, 0x5c, 0x5f, 0x53, 0x42, 0x5f, 0x00]).unwrap();

        let Object::Package(elements) = &*result else { panic!() };
        assert_eq!(elements.len(), 2);
        let Object::String { data, kind } = &*elements[0] else { panic!() };
        assert_eq!(data.as_slice(), b"\\_SB_");
        assert_eq!(*kind, StringKind::Path);
        assert_eq!(elements[1].as_integer(), Ok(0));
    }

    #[test]
    fn under_initialized_package() {
        // Return(Package(3) { 7 }) - the rest of the elements are
        // uninitialized.
        let result = run(&[0xa4, 0x12, 0x04, 0x03, 0x0a, 0x07]).unwrap();
        let Object::Package(elements) = &*result else { panic!() };
        assert_eq!(elements.len(), 3);
        assert_eq!(elements[0].as_integer(), Ok(7));
        assert_eq!(elements[1].typ(), ObjectType::Uninitialized);
        assert_eq!(elements[2].typ(), ObjectType::Uninitialized);
    }

    #[test]
    fn var_package_takes_a_computed_count() {
        // Return(VarPackage(2) { 5, 6 })
        let result = run(&[0xa4, 0x13, 0x07, 0x0a, 0x02, 0x0a, 0x05, 0x0a, 0x06]).unwrap();
        let Object::Package(elements) = &*result else { panic!() };
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].as_integer(), Ok(5));
        assert_eq!(elements[1].as_integer(), Ok(6));
    }

    #[test]
    fn external_declarations_are_skipped() {
        // External(QQQQ, 0, 0) - the name is allowed to be unresolved.
        run(&[0x15, 0x51, 0x51, 0x51, 0x51, 0x00, 0x00]).unwrap();
    }

    #[test]
    fn field_lists_are_parsed_past() {
        let interpreter = Interpreter::new(TestHandler, 2);
        // OperationRegion(REGN, SystemIO, 0x80, 4);
        // Field(REGN, AnyAcc) { FLDA, 8 };
        // Name(OK__, 1)
        interpreter
            .load_table(&[
                0x5b, 0x80, 0x52, 0x45, 0x47, 0x4e, 0x01, 0x0a, 0x80, 0x0a, 0x04,
                0x5b, 0x81, 0x0b, 0x52, 0x45, 0x47, 0x4e, 0x00, 0x46, 0x4c, 0x44, 0x41, 0x08,
                0x08, 0x4f, 0x4b, 0x5f, 0x5f, 0x01,
            ])
            .unwrap();

        // The cursor landed past the unit list, on the Name that follows.
        let result = interpreter.invoke_path("\\OK__", Vec::new()).unwrap();
        assert_eq!(result.as_integer(), Ok(1));
    }

    #[test]
    fn create_field_and_store() {
        let interpreter = Interpreter::new(TestHandler, 2);
        // Name(BUF_, Buffer(4) {}); CreateField(BUF_, 4, 12, FLD_);
        // Store(0xabc, FLD_)
        interpreter
            .load_table(&[
                0x08, 0x42, 0x55, 0x46, 0x5f, 0x11, 0x03, 0x0a, 0x04,
                0x5b, 0x13, 0x42, 0x55, 0x46, 0x5f, 0x0a, 0x04, 0x0a, 0x0c, 0x46, 0x4c, 0x44, 0x5f,
                0x70, 0x0b, 0xbc, 0x0a, 0x46, 0x4c, 0x44, 0x5f,
            ])
            .unwrap();

        let buffer = interpreter.invoke_path("\\BUF_", Vec::new()).unwrap();
        let Object::Buffer(data) = &*buffer else { panic!() };
        assert_eq!(data.as_slice(), &[0xc0, 0xab, 0x00, 0x00]);
    }

    #[test]
    fn field_reads_back_as_integer() {
        let interpreter = Interpreter::new(TestHandler, 2);
        // Name(BUF_, Buffer(2) { 0x34, 0x12 }); CreateWordField(BUF_, 0, FLD_)
        interpreter
            .load_table(&[
                0x08, 0x42, 0x55, 0x46, 0x5f, 0x11, 0x05, 0x0a, 0x02, 0x34, 0x12,
                0x8b, 0x42, 0x55, 0x46, 0x5f, 0x00, 0x46, 0x4c, 0x44, 0x5f,
            ])
            .unwrap();

        // Return(FLD_) reads through the field.
        let result = run_method(&interpreter, &[0xa4, 0x46, 0x4c, 0x44, 0x5f]).unwrap();
        assert_eq!(result.as_integer(), Ok(0x1234));
    }

    #[test]
    fn if_else() {
        // If(0) { Store(1, Local0) } Else { Store(2, Local0) }; Return(Local0)
        let result = run(&[
            0xa0, 0x06, 0x00, 0x70, 0x0a, 0x01, 0x60,
            0xa1, 0x05, 0x70, 0x0a, 0x02, 0x60,
            0xa4, 0x60,
        ])
        .unwrap();
        assert_eq!(result.as_integer(), Ok(2));

        // If(1) takes the then-branch and skips the else.
        let result = run(&[
            0xa0, 0x06, 0x01, 0x70, 0x0a, 0x01, 0x60,
            0xa1, 0x05, 0x70, 0x0a, 0x02, 0x60,
            0xa4, 0x60,
        ])
        .unwrap();
        assert_eq!(result.as_integer(), Ok(1));
    }

    #[test]
    fn while_break_terminates() {
        // While(1) { Break }; Return(0x63)
        let result = run(&[0xa2, 0x03, 0x01, 0xa5, 0xa4, 0x0a, 0x63]).unwrap();
        assert_eq!(result.as_integer(), Ok(0x63));
    }

    #[test]
    fn while_loop_counts() {
        // Store(0, Local0); While(LLess(Local0, 5)) { Increment(Local0) };
        // Return(Local0)
        let result = run(&[
            0x70, 0x00, 0x60,
            0xa2, 0x07, 0x95, 0x60, 0x0a, 0x05, 0x75, 0x60,
            0xa4, 0x60,
        ])
        .unwrap();
        assert_eq!(result.as_integer(), Ok(5));
    }

    #[test]
    fn deref_of_buffer_index() {
        // Return(DerefOf(Index(Buffer(2) { 0x11, 0x22 }, 1)))
        let result =
            run(&[0xa4, 0x83, 0x88, 0x11, 0x05, 0x0a, 0x02, 0x11, 0x22, 0x0a, 0x01, 0x00])
                .unwrap();
        assert_eq!(result.as_integer(), Ok(0x22));
    }

    #[test]
    fn deref_of_ref_of() {
        // Store(5, Local0); Return(DerefOf(RefOf(Local0)))
        let result = run(&[0x70, 0x0a, 0x05, 0x60, 0xa4, 0x83, 0x71, 0x60]).unwrap();
        assert_eq!(result.as_integer(), Ok(5));
    }

    #[test]
    fn upward_search_for_single_segments() {
        let interpreter = Interpreter::new(TestHandler, 2);
        // Device(XAAA) { Device(YAAA) { Device(ZAAA) { Name(FOO_, 7) } } }
        interpreter
            .load_table(&[
                0x5b, 0x82, 0x1a, 0x58, 0x41, 0x41, 0x41,
                0x5b, 0x82, 0x13, 0x59, 0x41, 0x41, 0x41,
                0x5b, 0x82, 0x0c, 0x5a, 0x41, 0x41, 0x41,
                0x08, 0x46, 0x4f, 0x4f, 0x5f, 0x0a, 0x07,
            ])
            .unwrap();

        let (deep, shallow) = {
            let namespace = interpreter.namespace.lock();
            (
                namespace.get_by_path("\\XAAA.YAAA.ZAAA").unwrap(),
                namespace.get_by_path("\\XAAA.YAAA").unwrap(),
            )
        };
        let method = Arc::new(Object::Method {
            // Return(FOO)
            code: alloc::vec![0xa4, 0x46, 0x4f, 0x4f, 0x5f],
            flags: MethodFlags(0),
            named_objects_persist: false,
        });

        // FOO resolves at the scope that holds it...
        let result = interpreter.execute_method(deep, method.clone(), Vec::new()).unwrap();
        assert_eq!(result.as_integer(), Ok(7));

        // ... but the search from a sibling scope climbs to the root and
        // misses, since FOO is not anywhere in that chain.
        let result = interpreter.execute_method(shallow, method, Vec::new());
        assert_eq!(result, Err(AmlError::ObjectNotFound));
    }

    #[test]
    fn to_buffer_of_to_integer_round_trips() {
        // Return(ToBuffer(ToInteger(Buffer(2) { 0x12, 0x34 })))
        let result =
            run(&[0xa4, 0x96, 0x99, 0x11, 0x05, 0x0a, 0x02, 0x12, 0x34, 0x00, 0x00]).unwrap();
        let Object::Buffer(data) = &*result else { panic!() };
        assert_eq!(data.as_slice(), &[0x12, 0x34, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn method_call_with_args() {
        let interpreter = Interpreter::new(TestHandler, 2);
        // Method(ADD1, 1) { Return(Add(Arg0, One)) }
        interpreter
            .load_table(&[
                0x14, 0x0b, 0x41, 0x44, 0x44, 0x31, 0x01, 0xa4, 0x72, 0x68, 0x01, 0x00,
            ])
            .unwrap();

        // Return(ADD1(5))
        let result =
            run_method(&interpreter, &[0xa4, 0x41, 0x44, 0x44, 0x31, 0x0a, 0x05]).unwrap();
        assert_eq!(result.as_integer(), Ok(6));

        let result = interpreter
            .invoke_path("\\ADD1", alloc::vec![Arc::new(Object::Integer(41))])
            .unwrap();
        assert_eq!(result.as_integer(), Ok(42));
    }

    #[test]
    fn method_locals_do_not_persist() {
        let interpreter = Interpreter::new(TestHandler, 2);

        // Name(TMP_, 7) inside a method is temporary...
        run_method(&interpreter, &[0x08, 0x54, 0x4d, 0x50, 0x5f, 0x0a, 0x07]).unwrap();
        assert_eq!(
            interpreter.namespace.lock().get_by_path("\\TMP_"),
            Err(AmlError::ObjectNotFound)
        );

        // ... but persists when created by a table load.
        interpreter.load_table(&[0x08, 0x54, 0x4d, 0x50, 0x5f, 0x0a, 0x07]).unwrap();
        assert!(interpreter.namespace.lock().get_by_path("\\TMP_").is_ok());
    }

    #[test]
    fn store_through_package_index() {
        // Name(PKG_, Package(2) { 5, 6 });
        // Store(0xaa, Index(PKG_, 0));
        // Return(DerefOf(Index(PKG_, 0)))
        let result = run(&[
            0x08, 0x50, 0x4b, 0x47, 0x5f, 0x12, 0x06, 0x02, 0x0a, 0x05, 0x0a, 0x06,
            0x70, 0x0a, 0xaa, 0x88, 0x50, 0x4b, 0x47, 0x5f, 0x00, 0x00,
            0xa4, 0x83, 0x88, 0x50, 0x4b, 0x47, 0x5f, 0x00, 0x00,
        ])
        .unwrap();
        assert_eq!(result.as_integer(), Ok(0xaa));
    }

    #[test]
    fn object_type_of_buffer_index_reports_buffer_field() {
        // Return(ObjectType(Index(Buffer(2) { 0xaa, 0xbb }, 1)))
        let result =
            run(&[0xa4, 0x8e, 0x88, 0x11, 0x05, 0x0a, 0x02, 0xaa, 0xbb, 0x0a, 0x01, 0x00])
                .unwrap();
        assert_eq!(result.as_integer(), Ok(14));
    }

    #[test]
    fn logical_ops() {
        // Return(LEqual("AB", "AB"))
        let result =
            run(&[0xa4, 0x93, 0x0d, 0x41, 0x42, 0x00, 0x0d, 0x41, 0x42, 0x00]).unwrap();
        assert_eq!(result.as_integer(), Ok(u64::MAX));

        // Return(LLess("AB", "ABC")) - content compare with length tiebreak.
        let result =
            run(&[0xa4, 0x95, 0x0d, 0x41, 0x42, 0x00, 0x0d, 0x41, 0x42, 0x43, 0x00]).unwrap();
        assert_eq!(result.as_integer(), Ok(u64::MAX));

        // Return(LNot(LEqual(5, 5))) - 0x92 composes with the comparison
        // that follows.
        let result = run(&[0xa4, 0x92, 0x93, 0x0a, 0x05, 0x0a, 0x05]).unwrap();
        assert_eq!(result.as_integer(), Ok(0));

        // Return(LAnd(1, 0))
        let result = run(&[0xa4, 0x90, 0x01, 0x00]).unwrap();
        assert_eq!(result.as_integer(), Ok(0));
    }

    #[test]
    fn concatenate() {
        // Return(Concat("AB", 0x1a)) - integers append as lower-case hex.
        let result = run(&[0xa4, 0x73, 0x0d, 0x41, 0x42, 0x00, 0x0a, 0x1a, 0x00]).unwrap();
        let Object::String { data, .. } = &*result else { panic!() };
        assert_eq!(data.as_slice(), b"AB1a");

        // Return(Concat(Buffer(1) { 0x01 }, Buffer(1) { 0x02 }))
        let result = run(&[
            0xa4, 0x73, 0x11, 0x04, 0x0a, 0x01, 0x01, 0x11, 0x04, 0x0a, 0x01, 0x02, 0x00,
        ])
        .unwrap();
        let Object::Buffer(data) = &*result else { panic!() };
        assert_eq!(data.as_slice(), &[0x01, 0x02]);
    }

    #[test]
    fn mid_of_string() {
        // Return(Mid("HELLO", 1, 3))
        let result = run(&[
            0xa4, 0x9e, 0x0d, 0x48, 0x45, 0x4c, 0x4c, 0x4f, 0x00, 0x0a, 0x01, 0x0a, 0x03, 0x00,
        ])
        .unwrap();
        let Object::String { data, .. } = &*result else { panic!() };
        assert_eq!(data.as_slice(), b"ELL");
    }

    #[test]
    fn to_hex_string_of_buffer() {
        // Return(ToHexString(Buffer(2) { 0x0a, 0x0b }))
        let result = run(&[0xa4, 0x98, 0x11, 0x05, 0x0a, 0x02, 0x0a, 0x0b, 0x00]).unwrap();
        let Object::String { data, .. } = &*result else { panic!() };
        assert_eq!(data.as_slice(), b"0x0A,0x0B");
    }

    #[test]
    fn divide() {
        // Return(Divide(7, 2)) yields the quotient.
        let result = run(&[0xa4, 0x78, 0x0a, 0x07, 0x0a, 0x02, 0x00, 0x00]).unwrap();
        assert_eq!(result.as_integer(), Ok(3));

        // Division by zero is not fatal; both results are 0.
        let result = run(&[0xa4, 0x78, 0x0a, 0x07, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(result.as_integer(), Ok(0));
    }

    #[test]
    fn cond_ref_of() {
        // Return(CondRefOf(QQQQ)) with QQQQ undefined.
        let result = run(&[0xa4, 0x5b, 0x12, 0x51, 0x51, 0x51, 0x51, 0x00]).unwrap();
        assert_eq!(result.as_integer(), Ok(0));

        // Store(5, Local0); Return(CondRefOf(Local0))
        let result = run(&[0x70, 0x0a, 0x05, 0x60, 0xa4, 0x5b, 0x12, 0x60, 0x00]).unwrap();
        assert_eq!(result.as_integer(), Ok(u64::MAX));
    }

    #[test]
    fn alias_shares_the_object() {
        // Name(ORIG, 5); Alias(ORIG, ALIA); Return(ALIA)
        let result = run(&[
            0x08, 0x4f, 0x52, 0x49, 0x47, 0x0a, 0x05,
            0x06, 0x4f, 0x52, 0x49, 0x47, 0x41, 0x4c, 0x49, 0x41,
            0xa4, 0x41, 0x4c, 0x49, 0x41,
        ])
        .unwrap();
        assert_eq!(result.as_integer(), Ok(5));
    }

    #[test]
    fn scope_reopens_a_device() {
        let interpreter = Interpreter::new(TestHandler, 2);
        // Device(DEVA) {}; Scope(DEVA) { Name(VALU, 7) }
        interpreter
            .load_table(&[
                0x5b, 0x82, 0x05, 0x44, 0x45, 0x56, 0x41,
                0x10, 0x0c, 0x44, 0x45, 0x56, 0x41, 0x08, 0x56, 0x41, 0x4c, 0x55, 0x0a, 0x07,
            ])
            .unwrap();

        let result = interpreter.invoke_path("\\DEVA.VALU", Vec::new()).unwrap();
        assert_eq!(result.as_integer(), Ok(7));
    }

    #[test]
    fn op_region_is_recorded() {
        let interpreter = Interpreter::new(TestHandler, 2);
        // OperationRegion(OPR0, SystemIO, 0x80, 4)
        interpreter
            .load_table(&[0x5b, 0x80, 0x4f, 0x50, 0x52, 0x30, 0x01, 0x0a, 0x80, 0x0a, 0x04])
            .unwrap();

        let region = interpreter.invoke_path("\\OPR0", Vec::new()).unwrap();
        let Object::OpRegion(region) = &*region else { panic!() };
        assert_eq!(region.space, RegionSpace::SystemIO);
        assert_eq!(region.offset, 0x80);
        assert_eq!(region.length, 4);
    }

    #[test]
    fn store_to_debug_is_accepted() {
        // Store(5, Debug)
        run(&[0x70, 0x0a, 0x05, 0x5b, 0x31]).unwrap();
    }

    #[test]
    fn errors() {
        assert_eq!(run(&[0xa5]), Err(AmlError::BreakOutsideOfWhile));
        assert_eq!(run(&[0x9f]), Err(AmlError::ContinueOutsideOfWhile));
        assert_eq!(run(&[0x02]), Err(AmlError::IllegalOpcode(0x02)));
        // A digit byte is a reserved opcode slot.
        assert_eq!(run(&[0x31]), Err(AmlError::BadBytecode));
        // Buffer of declared size 0.
        assert_eq!(run(&[0x11, 0x03, 0x0a, 0x00]), Err(AmlError::BadBytecode));
        // Acquire is not implemented.
        assert_eq!(
            run(&[0x5b, 0x23, 0x4d, 0x54, 0x58, 0x5f, 0xff, 0xff]),
            Err(AmlError::Unimplemented)
        );
    }

    #[test]
    fn revision_1_numbers_are_32_bit() {
        let interpreter = Interpreter::new(TestHandler, 1);

        // Return(Add(0xffffffff, 1)) wraps at 32 bits.
        let result = run_method(
            &interpreter,
            &[0xa4, 0x72, 0x0c, 0xff, 0xff, 0xff, 0xff, 0x01, 0x00],
        )
        .unwrap();
        assert_eq!(result.as_integer(), Ok(0));

        // Ones is sized by the revision.
        let result = run_method(&interpreter, &[0xa4, 0xff]).unwrap();
        assert_eq!(result.as_integer(), Ok(0xffff_ffff));
    }

    #[test]
    fn to_integer_parses_strings() {
        // Return(ToInteger("0x1A"))
        let result = run(&[0xa4, 0x99, 0x0d, 0x30, 0x78, 0x31, 0x41, 0x00, 0x00]).unwrap();
        assert_eq!(result.as_integer(), Ok(0x1a));
    }

    #[test]
    fn names() {
        assert_eq!(
            name_string_to_path(b"\\\x2eABC_DEF_", 0),
            Ok(b"\\ABC_.DEF_".to_vec())
        );
        assert_eq!(name_string_to_path(b"^^FOO_", 0), Ok(b"^^FOO_".to_vec()));
    }
}
