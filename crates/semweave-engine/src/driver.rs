//! Orchestration pass
//!
//! Walks the types of a module base-first, matches annotated members against
//! the task table, runs each task against a read-only view of the module and
//! commits the resulting edits before the next task runs. Any error aborts
//! the pass; [`weave_file`] only writes the module back when the whole pass
//! succeeded.

use crate::config::{AnnotationKind, WeaveConfig};
use crate::context::GenerationContext;
use crate::error::Result;
use crate::resolver::{import_instructions, import_type, ModuleFile, ModuleResolver};
use crate::tasks::{
    is_synthesized_accessor, ChangeNotificationTask, Edit, GeneratorTask, MappedPropertyTask,
    RewrittenMember, TaskKind, TypeEdit, TypeHierarchyTask,
};
use rustc_hash::{FxHashMap, FxHashSet};
use semweave_bytecode::{disassemble, verify_method, CustomAttribute, Module, TypeDef, VerifyError};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, debug_span, info, info_span, warn};

/// Which task an annotation kind selects
const TASK_TABLE: &[(AnnotationKind, TaskKind)] = &[
    (AnnotationKind::TypeIdentifiers, TaskKind::TypeHierarchy),
    (AnnotationKind::PersistentIdentifier, TaskKind::MappedProperty),
    (AnnotationKind::ChangeNotification, TaskKind::ChangeNotification),
];

fn task_for(kind: AnnotationKind) -> Option<TaskKind> {
    TASK_TABLE
        .iter()
        .find(|(annotation, _)| *annotation == kind)
        .map(|(_, task)| *task)
}

fn requested_tasks(attributes: &[CustomAttribute], config: &WeaveConfig) -> FxHashSet<TaskKind> {
    attributes
        .iter()
        .filter_map(|a| config.annotation_kind(&a.full_name()))
        .filter_map(task_for)
        .collect()
}

/// Summary of one weaving pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeaveReport {
    pub module: String,
    /// The module carried the instrumented flag and was left untouched
    pub already_instrumented: bool,
    pub fields_injected: usize,
    pub fields_removed: usize,
    pub methods_added: usize,
    /// Number of constructor preludes inserted
    pub constructors_patched: usize,
    pub members: Vec<RewrittenMember>,
}

impl WeaveReport {
    fn new(module: &str) -> Self {
        Self {
            module: module.to_string(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Tasks applicable to one type, in execution order
///
/// Mapped properties come first, then change-notification setters, then the
/// type-hierarchy override. A class-level change-notification annotation
/// selects every property whose setter the compiler synthesized; mapped
/// properties already get a notifying setter and are not selected twice.
pub fn plan_type(module: &Module, type_index: usize, config: &WeaveConfig) -> Vec<Box<dyn GeneratorTask>> {
    let Some(ty) = module.types.get(type_index) else {
        return Vec::new();
    };
    let type_tasks = requested_tasks(&ty.attributes, config);
    let notify_all = type_tasks.contains(&TaskKind::ChangeNotification);

    let mut mapped = Vec::new();
    let mut notify = Vec::new();
    for (index, property) in ty.properties.iter().enumerate() {
        let tasks = requested_tasks(&property.attributes, config);
        if tasks.contains(&TaskKind::MappedProperty) {
            mapped.push(index);
        } else if tasks.contains(&TaskKind::ChangeNotification)
            || (notify_all && has_synthesized_setter(ty, property.setter))
        {
            notify.push(index);
        }
    }

    let mut plan: Vec<Box<dyn GeneratorTask>> = Vec::new();
    let hierarchy = type_tasks.contains(&TaskKind::TypeHierarchy) || !mapped.is_empty();
    plan.extend(
        mapped
            .into_iter()
            .map(|p| Box::new(MappedPropertyTask::new(type_index, p)) as Box<dyn GeneratorTask>),
    );
    plan.extend(
        notify
            .into_iter()
            .map(|p| Box::new(ChangeNotificationTask::new(type_index, p)) as Box<dyn GeneratorTask>),
    );
    if hierarchy {
        plan.push(Box::new(TypeHierarchyTask::new(type_index)));
    }
    plan
}

fn has_synthesized_setter(ty: &TypeDef, setter: Option<usize>) -> bool {
    setter
        .and_then(|s| ty.methods.get(s))
        .is_some_and(is_synthesized_accessor)
}

/// Type indices ordered so every base type in the module precedes its
/// derived types; declaration order is kept otherwise
pub fn base_first_order(module: &Module) -> Vec<usize> {
    let local_base = |ty: &TypeDef| -> Option<usize> {
        let base = ty.base_type.as_ref()?.type_ref()?;
        match base.scope.as_deref() {
            None => module.type_index(&base.full_name()),
            Some(scope) if scope == module.name => module.type_index(&base.full_name()),
            Some(_) => None,
        }
    };
    let depth = |start: usize| {
        let mut depth = 0;
        let mut current = start;
        // bounded by the type count in case of a malformed cycle
        while depth < module.types.len() {
            match local_base(&module.types[current]) {
                Some(base) => {
                    depth += 1;
                    current = base;
                }
                None => break,
            }
        }
        depth
    };
    let mut order: Vec<usize> = (0..module.types.len()).collect();
    order.sort_by_cached_key(|&index| depth(index));
    order
}

/// Weave a module in memory
///
/// Every module the target refers to must already be registered with or
/// loadable by `resolver`; see [`ModuleResolver::preload_for`]. The pass
/// runs on a copy of `module`, which replaces the original only once every
/// task has succeeded; on error `module` is left unchanged.
pub fn weave_module(
    module: &mut Module,
    resolver: &ModuleResolver,
    config: &WeaveConfig,
) -> Result<WeaveReport> {
    let span = info_span!("weave", module = %module.name);
    let _enter = span.enter();

    let mut report = WeaveReport::new(&module.name);
    if module.is_instrumented() {
        warn!("module is already instrumented, skipping");
        report.already_instrumented = true;
        return Ok(report);
    }

    let mut work = module.clone();
    weave_types(&mut work, resolver, config, &mut report)?;
    work.mark_instrumented();
    *module = work;
    info!(
        members = report.members.len(),
        fields = report.fields_injected,
        constructors = report.constructors_patched,
        "module woven"
    );
    Ok(report)
}

fn weave_types(
    module: &mut Module,
    resolver: &ModuleResolver,
    config: &WeaveConfig,
    report: &mut WeaveReport,
) -> Result<()> {
    let mut cursors: FxHashMap<(usize, usize), usize> = FxHashMap::default();
    for type_index in base_first_order(module) {
        let plan = plan_type(module, type_index, config);
        if plan.is_empty() {
            continue;
        }
        let type_name = module.types[type_index].full_name();
        let span = debug_span!("type", name = %type_name);
        let _enter = span.enter();

        let mut touched = FxHashSet::default();
        for task in plan {
            let edit = {
                let ctx = GenerationContext::new(module, resolver, config);
                if !task.can_execute(&ctx) {
                    debug!(task = ?task.kind(), "task not applicable");
                    continue;
                }
                task.execute(&ctx)?
            };
            if edit.is_empty() {
                debug!(task = ?task.kind(), "nothing to rewrite");
                continue;
            }
            apply_edit(module, edit, &mut cursors, &mut touched, report);
        }

        if config.verify {
            let ty = &module.types[type_index];
            for &method in &touched {
                let def = &ty.methods[method];
                verify_method(def).map_err(|e| VerifyError::InMethod {
                    method: format!("{}::{}", type_name, def.name),
                    source: Box::new(e),
                })?;
            }
        }
    }

    Ok(())
}

/// Commit one task's edits to the module
///
/// Constructor preludes go after the preludes already inserted into the same
/// constructor during this pass, so initializers run in property order.
fn apply_edit(
    module: &mut Module,
    edit: TypeEdit,
    cursors: &mut FxHashMap<(usize, usize), usize>,
    touched: &mut FxHashSet<usize>,
    report: &mut WeaveReport,
) {
    let TypeEdit {
        type_index,
        edits,
        rewritten,
    } = edit;

    for edit in edits {
        match edit {
            Edit::ReplaceBody { method, body } => {
                import_instructions(module, &body.instructions);
                let def = &mut module.types[type_index].methods[method];
                debug!(method = %def.name, "\n{}", disassemble(&body.instructions));
                def.body = Some(body);
                touched.insert(method);
            }
            Edit::PrependToConstructor {
                method,
                prelude,
                max_stack,
            } => {
                import_instructions(module, &prelude);
                let def = &mut module.types[type_index].methods[method];
                let Some(body) = def.body.as_mut() else {
                    debug!(method = %def.name, "constructor has no body, skipping");
                    continue;
                };
                let cursor = cursors.entry((type_index, method)).or_insert(0);
                let count = prelude.len();
                body.insert(*cursor, prelude);
                *cursor += count;
                body.max_stack = body.max_stack.max(max_stack);
                touched.insert(method);
                report.constructors_patched += 1;
            }
            Edit::AddField(field) => {
                import_type(module, &field.field_type);
                debug!(field = %field.name, "field injected");
                module.types[type_index].fields.push(field);
                report.fields_injected += 1;
            }
            Edit::RemoveField(name) => {
                let fields = &mut module.types[type_index].fields;
                let before = fields.len();
                fields.retain(|f| f.name != name);
                if fields.len() < before {
                    debug!(field = %name, "backing field removed");
                    report.fields_removed += 1;
                }
            }
            Edit::AddMethod(method) => {
                import_type(module, &method.return_type);
                if let Some(body) = &method.body {
                    for local in &body.locals {
                        import_type(module, local);
                    }
                    import_instructions(module, &body.instructions);
                    debug!(method = %method.name, "\n{}", disassemble(&body.instructions));
                }
                let index = module.types[type_index].add_method(method);
                touched.insert(index);
                report.methods_added += 1;
            }
        }
    }

    if let Some(member) = rewritten {
        info!("{}.{} -> {}", member.type_name, member.member, member.detail);
        report.members.push(member);
    }
}

/// Open a module file, weave it and write it back
///
/// Referenced modules are loaded through `resolver` first. The file is left
/// untouched when the pass fails or the module was already instrumented.
pub fn weave_file(
    path: impl AsRef<Path>,
    resolver: &mut ModuleResolver,
    config: &WeaveConfig,
) -> Result<WeaveReport> {
    let mut file = ModuleFile::open(path)?;
    resolver.preload_for(&file.module, config)?;
    let report = weave_module(&mut file.module, resolver, config)?;
    if !report.already_instrumented {
        file.save()?;
    }
    Ok(report)
}
