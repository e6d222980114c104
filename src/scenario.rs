//! JSON scenario files.
//!
//! A scenario declares the world a constraint system runs against
//! (protocols, nominal types and values), then the type variables and
//! constraints of one system over that world:
//!
//! ```json
//! {
//!   "types": [{ "name": "Int" }, { "name": "String" }],
//!   "values": [
//!     { "id": "f_int", "name": "f",
//!       "type": { "function": { "input": { "nominal": "Int" }, "result": { "tuple": [] } } } },
//!     { "id": "f_string", "name": "f",
//!       "type": { "function": { "input": { "nominal": "String" }, "result": { "tuple": [] } } } }
//!   ],
//!   "type_vars": [{ "name": "callee", "anchor": 0 }, "result"],
//!   "constraints": [
//!     { "kind": "overload", "bound": { "var": "callee" }, "choices": ["f_int", "f_string"], "anchor": 0 },
//!     { "kind": "applicable_function",
//!       "function": { "function": { "input": { "nominal": "Int" }, "result": { "var": "result" } } },
//!       "callee": { "var": "callee" } }
//!   ]
//! }
//! ```
//!
//! Loading happens in two steps. [`Scenario::build_decls`] turns the
//! declarations into a [`DeclTable`]; [`Scenario::populate`] then creates the
//! type variables and adds the constraints to a system built over that table.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;
use tessera_solver::{
    Anchor, Constraint, ConstraintSystem, LocatorId, LocatorStore, MatchKind, OverloadChoice,
    SolverConfig, TypeProperty, TypeVarOptions,
};
use tessera_types::{
    Conformance, DeclAttrs, DeclContext, DeclIntrospection, DeclTable, FunctionExt,
    GenericParamTy, GenericSignature, LValueQuals, NominalId, NominalKind, ProtocolId, Symbol,
    TupleElt, Type, TypeVarId, ValueDeclId, ValueDeclKind,
};

use crate::error::{ScenarioError, ScenarioResult};

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Scenario {
    pub config: SolverConfig,
    pub protocols: Vec<ProtocolSpec>,
    pub types: Vec<NominalSpec>,
    pub values: Vec<ValueSpec>,
    pub type_vars: Vec<TypeVarSpec>,
    pub constraints: Vec<ConstraintSpec>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProtocolSpec {
    pub name: String,
    #[serde(default)]
    pub inherits: Vec<String>,
    #[serde(default)]
    pub class_bound: bool,
    /// Values of this protocol's existential answer any `objc` member.
    #[serde(default)]
    pub dynamic_lookup: bool,
    #[serde(default)]
    pub literal_default: Option<TypeSpec>,
    #[serde(default)]
    pub associated_types: Vec<AssocTypeSpec>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssocTypeSpec {
    pub name: String,
    #[serde(default)]
    pub conforms_to: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NominalSpec {
    pub name: String,
    #[serde(default)]
    pub kind: NominalKindSpec,
    #[serde(default)]
    pub superclass: Option<String>,
    #[serde(default)]
    pub conforms_to: Vec<ConformanceSpec>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NominalKindSpec {
    #[default]
    Struct,
    Class,
    Enum,
}

impl From<NominalKindSpec> for NominalKind {
    fn from(kind: NominalKindSpec) -> Self {
        match kind {
            NominalKindSpec::Struct => NominalKind::Struct,
            NominalKindSpec::Class => NominalKind::Class,
            NominalKindSpec::Enum => NominalKind::Enum,
        }
    }
}

/// A conformance: a bare protocol name, or a protocol with witnesses.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ConformanceSpec {
    Protocol(String),
    Witnessed {
        protocol: String,
        /// Associated type name to witness type.
        #[serde(default)]
        type_witnesses: BTreeMap<String, TypeSpec>,
        /// Requirement value id to witness value id.
        #[serde(default)]
        value_witnesses: BTreeMap<String, String>,
    },
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValueSpec {
    /// Key used by overload choices and witnesses; defaults to `name`.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub kind: ValueKindSpec,
    /// A nominal type or protocol name; top level when absent.
    #[serde(default)]
    pub context: Option<String>,
    #[serde(rename = "type")]
    pub ty: TypeSpec,
    #[serde(default, rename = "static")]
    pub is_static: bool,
    #[serde(default)]
    pub settable: Option<bool>,
    #[serde(default)]
    pub generic_params: Vec<GenericParamSpec>,
    #[serde(default)]
    pub attrs: AttrsSpec,
}

impl ValueSpec {
    pub fn key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKindSpec {
    #[default]
    Func,
    Var,
    Subscript,
    Constructor,
    EnumElement,
    TypeAlias,
}

impl From<ValueKindSpec> for ValueDeclKind {
    fn from(kind: ValueKindSpec) -> Self {
        match kind {
            ValueKindSpec::Func => ValueDeclKind::Func,
            ValueKindSpec::Var => ValueDeclKind::Var,
            ValueKindSpec::Subscript => ValueDeclKind::Subscript,
            ValueKindSpec::Constructor => ValueDeclKind::Constructor,
            ValueKindSpec::EnumElement => ValueDeclKind::EnumElement,
            ValueKindSpec::TypeAlias => ValueDeclKind::TypeAlias,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenericParamSpec {
    pub name: String,
    #[serde(default)]
    pub conforms_to: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AttrsSpec {
    pub assignment: bool,
    pub conversion: bool,
    pub optional: bool,
    pub objc: bool,
    pub imported: bool,
}

impl From<AttrsSpec> for DeclAttrs {
    fn from(attrs: AttrsSpec) -> Self {
        DeclAttrs {
            assignment: attrs.assignment,
            conversion: attrs.conversion,
            optional: attrs.optional,
            objc: attrs.objc,
            imported: attrs.imported,
        }
    }
}

/// A type written in a scenario.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeSpec {
    Nominal(String),
    Protocol(String),
    /// An existential of several protocols.
    Composition(Vec<String>),
    Tuple(Vec<TupleEltSpec>),
    Function(Box<FunctionSpec>),
    Optional(Box<TypeSpec>),
    Array(Box<TypeSpec>),
    Metatype(Box<TypeSpec>),
    /// Implicit lvalue, as formed by referencing storage.
    Lvalue(Box<TypeSpec>),
    /// Explicit lvalue, as passed to an `inout` parameter.
    Inout(Box<TypeSpec>),
    /// A type variable declared in `type_vars`.
    Var(String),
    /// A generic parameter of the enclosing value, or `Self` inside a protocol.
    Param(String),
    /// An associated type of a generic parameter.
    Member { base: String, name: String },
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum TupleEltSpec {
    Element(ElementSpec),
    Plain(TypeSpec),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElementSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub ty: TypeSpec,
    #[serde(default)]
    pub variadic: bool,
    #[serde(default)]
    pub default: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionSpec {
    pub input: TypeSpec,
    pub result: TypeSpec,
    #[serde(default)]
    pub auto_closure: bool,
    #[serde(default)]
    pub no_return: bool,
}

/// A type variable: a bare name, or a name with options.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum TypeVarSpec {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        lvalue: bool,
        #[serde(default)]
        prefers_subtype: bool,
        #[serde(default)]
        anchor: Option<u32>,
    },
}

impl TypeVarSpec {
    pub fn name(&self) -> &str {
        match self {
            TypeVarSpec::Name(name) | TypeVarSpec::Detailed { name, .. } => name,
        }
    }

    fn options(&self) -> TypeVarOptions {
        let TypeVarSpec::Detailed {
            lvalue,
            prefers_subtype,
            ..
        } = self
        else {
            return TypeVarOptions::NONE;
        };
        let mut options = TypeVarOptions::NONE;
        if *lvalue {
            options = options.lvalue_allowed();
        }
        if *prefers_subtype {
            options = options.prefers_subtype();
        }
        options
    }

    fn anchor(&self) -> Option<u32> {
        match self {
            TypeVarSpec::Name(_) => None,
            TypeVarSpec::Detailed { anchor, .. } => *anchor,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ConstraintSpec {
    #[serde(flatten)]
    pub kind: ConstraintKindSpec,
    /// Expression the constraint is attributed to.
    #[serde(default)]
    pub anchor: Option<u32>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintKindSpec {
    Bind {
        first: TypeSpec,
        second: TypeSpec,
    },
    Equal {
        first: TypeSpec,
        second: TypeSpec,
    },
    TrivialSubtype {
        first: TypeSpec,
        second: TypeSpec,
    },
    Subtype {
        first: TypeSpec,
        second: TypeSpec,
    },
    Conversion {
        first: TypeSpec,
        second: TypeSpec,
    },
    Construction {
        argument: TypeSpec,
        value: TypeSpec,
    },
    ApplicableFunction {
        function: TypeSpec,
        callee: TypeSpec,
    },
    ConformsTo {
        #[serde(rename = "type")]
        ty: TypeSpec,
        protocol: String,
    },
    SelfObjectOf {
        #[serde(rename = "type")]
        ty: TypeSpec,
        protocol: String,
    },
    CheckedCast {
        from: TypeSpec,
        to: TypeSpec,
    },
    ValueMember {
        base: TypeSpec,
        name: String,
        member: TypeSpec,
    },
    TypeMember {
        base: TypeSpec,
        name: String,
        member: TypeSpec,
    },
    Archetype {
        #[serde(rename = "type")]
        ty: TypeSpec,
    },
    Class {
        #[serde(rename = "type")]
        ty: TypeSpec,
    },
    DynamicLookupValue {
        #[serde(rename = "type")]
        ty: TypeSpec,
    },
    /// An overload set: `bound` is bound to one of the choices.
    Overload {
        bound: TypeSpec,
        choices: Vec<ChoiceSpec>,
    },
    Conjunction {
        constraints: Vec<ConstraintSpec>,
    },
    Disjunction {
        constraints: Vec<ConstraintSpec>,
    },
}

/// An overload choice: a value id, or a member reference on a base type.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ChoiceSpec {
    Value(String),
    Member {
        decl: String,
        base: TypeSpec,
        #[serde(default)]
        dynamic: bool,
    },
}

/// The declarations of a scenario and the names they were declared under.
pub struct ScenarioDecls<'db> {
    pub table: DeclTable<'db>,
    nominals: HashMap<String, NominalId>,
    protocols: HashMap<String, ProtocolId>,
    values: HashMap<String, ValueDeclId>,
    value_keys: HashMap<ValueDeclId, String>,
}

/// The type variables of a scenario, by name.
#[derive(Clone, Debug, Default)]
pub struct ScenarioVars<'db> {
    by_name: HashMap<String, Type<'db>>,
    names: BTreeMap<TypeVarId, String>,
}

impl<'db> ScenarioVars<'db> {
    pub fn get(&self, name: &str) -> Option<Type<'db>> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, var: TypeVarId) -> Option<&str> {
        self.names.get(&var).map(String::as_str)
    }

    /// Variables in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (TypeVarId, &str)> {
        self.names.iter().map(|(var, name)| (*var, name.as_str()))
    }
}

struct ScopedParam {
    name: String,
    param: GenericParamTy,
    conforms_to: Vec<ProtocolId>,
}

/// Names a type can refer to besides declarations.
#[derive(Default)]
struct Scope<'s, 'db> {
    params: &'s [ScopedParam],
    vars: Option<&'s HashMap<String, Type<'db>>>,
}

impl Scope<'_, '_> {
    fn param(&self, name: &str) -> ScenarioResult<&ScopedParam> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ScenarioError::unknown_generic_param(name))
    }
}

impl Scenario {
    pub fn from_json(text: &str) -> ScenarioResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> ScenarioResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Declare every protocol, type and value of the scenario.
    pub fn build_decls<'db>(
        &self,
        db: &'db dyn salsa::Database,
    ) -> ScenarioResult<ScenarioDecls<'db>> {
        let mut decls = ScenarioDecls {
            table: DeclTable::new(db),
            nominals: HashMap::new(),
            protocols: HashMap::new(),
            values: HashMap::new(),
            value_keys: HashMap::new(),
        };
        let no_scope = Scope::default();

        // Protocols first: everything else may refer to them.
        for proto in &self.protocols {
            if decls.protocols.contains_key(&proto.name) {
                return Err(ScenarioError::duplicate("protocol", &proto.name));
            }
            let id = decls.table.add_protocol(&proto.name);
            decls.protocols.insert(proto.name.clone(), id);
        }
        for proto in &self.protocols {
            let id = decls.protocol_id(&proto.name)?;
            let inherited = decls.protocol_ids(&proto.inherits)?;
            let decl = decls.table.protocol_mut(id);
            decl.inherited = inherited;
            decl.class_bound = proto.class_bound;
            let self_archetype = decl.self_param.archetype;
            if proto.class_bound {
                decls.table.archetype_mut(self_archetype).requires_class = true;
            }
            if proto.dynamic_lookup {
                decls.table.set_dynamic_lookup(id);
            }
            for assoc in &proto.associated_types {
                let conforms_to = decls.protocol_ids(&assoc.conforms_to)?;
                decls.table.add_assoc_type(id, &assoc.name, conforms_to);
            }
        }

        for nominal in &self.types {
            if decls.nominals.contains_key(&nominal.name) {
                return Err(ScenarioError::duplicate("type", &nominal.name));
            }
            let id = decls.table.add_nominal(&nominal.name, nominal.kind.into());
            decls.nominals.insert(nominal.name.clone(), id);
        }
        for nominal in &self.types {
            if let Some(superclass) = &nominal.superclass {
                let class = decls.nominal_id(&nominal.name)?;
                let superclass = Type::nominal(db, decls.nominal_id(superclass)?);
                decls.table.set_superclass(class, superclass);
            }
        }
        for proto in &self.protocols {
            if let Some(default) = &proto.literal_default {
                let id = decls.protocol_id(&proto.name)?;
                let default = decls.resolve(default, &no_scope)?;
                decls.table.protocol_mut(id).literal_default = Some(default);
            }
        }

        for value in &self.values {
            let key = value.key();
            if decls.values.contains_key(key) {
                return Err(ScenarioError::duplicate("value", key));
            }
            let context = match &value.context {
                Some(name) => decls.context(name)?,
                None => decls.table.top_level(),
            };
            let ty = decls.value_type(value, context)?;
            let id = decls
                .table
                .add_value(&value.name, value.kind.into(), context, ty);
            let decl = decls.table.value_mut(id);
            decl.is_static = value.is_static;
            if let Some(settable) = value.settable {
                decl.settable = settable;
            }
            decl.attrs = value.attrs.into();
            decls.values.insert(key.to_owned(), id);
            decls.value_keys.insert(id, key.to_owned());
        }

        // Witnesses name values, so conformances come last.
        for nominal in &self.types {
            let id = decls.nominal_id(&nominal.name)?;
            for spec in &nominal.conforms_to {
                let conformance = decls.conformance(spec)?;
                decls.table.add_conformance(id, conformance);
            }
        }
        Ok(decls)
    }

    /// Create the scenario's type variables in `cs` and add its constraints.
    ///
    /// `cs` must be built over `decls`.
    pub fn populate<'db>(
        &self,
        cs: &mut ConstraintSystem<'_, 'db>,
        decls: &ScenarioDecls<'db>,
    ) -> ScenarioResult<ScenarioVars<'db>> {
        let db = cs.db();
        let mut vars = ScenarioVars::default();
        for spec in &self.type_vars {
            let name = spec.name();
            if vars.by_name.contains_key(name) {
                return Err(ScenarioError::duplicate("type variable", name));
            }
            let locator = spec
                .anchor()
                .map(|id| cs.locators_mut().anchor(Anchor::expr(id)));
            let var = cs.create_type_var(spec.options(), locator);
            vars.by_name
                .insert(name.to_owned(), Type::type_var(db, var));
            vars.names.insert(var, name.to_owned());
        }

        let scope = Scope {
            params: &[],
            vars: Some(&vars.by_name),
        };
        for spec in &self.constraints {
            if let ConstraintKindSpec::Overload { bound, choices } = &spec.kind {
                let locator = spec
                    .anchor
                    .map(|id| cs.locators_mut().anchor(Anchor::expr(id)));
                let bound = decls.resolve(bound, &scope)?;
                let choices = decls.choices(choices, &scope)?;
                cs.add_overload_set(bound, choices, locator);
                continue;
            }
            let constraint = decls.constraint(spec, &scope, cs.locators_mut(), None)?;
            cs.add_constraint(constraint);
        }
        Ok(vars)
    }
}

impl<'db> ScenarioDecls<'db> {
    pub fn nominal(&self, name: &str) -> Option<NominalId> {
        self.nominals.get(name).copied()
    }

    pub fn protocol(&self, name: &str) -> Option<ProtocolId> {
        self.protocols.get(name).copied()
    }

    pub fn value(&self, key: &str) -> Option<ValueDeclId> {
        self.values.get(key).copied()
    }

    /// The key a value was declared under.
    pub fn value_key(&self, decl: ValueDeclId) -> Option<&str> {
        self.value_keys.get(&decl).map(String::as_str)
    }

    fn nominal_id(&self, name: &str) -> ScenarioResult<NominalId> {
        self.nominal(name)
            .ok_or_else(|| ScenarioError::unknown_type(name))
    }

    fn protocol_id(&self, name: &str) -> ScenarioResult<ProtocolId> {
        self.protocol(name)
            .ok_or_else(|| ScenarioError::unknown_protocol(name))
    }

    fn protocol_ids(&self, names: &[String]) -> ScenarioResult<Vec<ProtocolId>> {
        names.iter().map(|name| self.protocol_id(name)).collect()
    }

    fn value_id(&self, key: &str) -> ScenarioResult<ValueDeclId> {
        self.value(key)
            .ok_or_else(|| ScenarioError::unknown_value(key))
    }

    fn context(&self, name: &str) -> ScenarioResult<DeclContext> {
        if let Some(nominal) = self.nominal(name) {
            return Ok(DeclContext::Nominal(nominal));
        }
        if let Some(proto) = self.protocol(name) {
            return Ok(DeclContext::Protocol(proto));
        }
        Err(ScenarioError::unknown_context(name))
    }

    /// The interface type of a value. Generic parameters of a protocol
    /// member sit below the protocol's `Self`.
    fn value_type(&mut self, value: &ValueSpec, context: DeclContext) -> ScenarioResult<Type<'db>> {
        let db = self.table.db();
        let mut params = Vec::new();
        if let DeclContext::Protocol(proto) = context {
            let self_param = self.table.protocol_decl(proto).self_param;
            params.push(ScopedParam {
                name: "Self".to_owned(),
                param: self_param.param,
                conforms_to: vec![proto],
            });
        }
        if value.generic_params.is_empty() {
            return self.resolve(
                &value.ty,
                &Scope {
                    params: &params,
                    vars: None,
                },
            );
        }

        let TypeSpec::Function(function) = &value.ty else {
            return Err(ScenarioError::generic_not_function(value.key()));
        };
        let depth = u32::from(matches!(context, DeclContext::Protocol(_)));
        let mut generic = Vec::with_capacity(value.generic_params.len());
        for (index, spec) in value.generic_params.iter().enumerate() {
            let conforms_to = self.protocol_ids(&spec.conforms_to)?;
            let decl =
                self.table
                    .add_generic_param(depth, index as u32, &spec.name, conforms_to.clone());
            params.push(ScopedParam {
                name: spec.name.clone(),
                param: decl.param,
                conforms_to,
            });
            generic.push(decl);
        }
        let scope = Scope {
            params: &params,
            vars: None,
        };
        let input = self.resolve(&function.input, &scope)?;
        let result = self.resolve(&function.result, &scope)?;
        let requirements = self.table.conformance_requirements(&generic);
        Ok(Type::generic_function(
            db,
            GenericSignature::new(generic, requirements),
            input,
            result,
        ))
    }

    fn conformance(&self, spec: &ConformanceSpec) -> ScenarioResult<Conformance<'db>> {
        let (protocol, type_witnesses, value_witnesses) = match spec {
            ConformanceSpec::Protocol(name) => {
                return Ok(Conformance::new(self.protocol_id(name)?));
            }
            ConformanceSpec::Witnessed {
                protocol,
                type_witnesses,
                value_witnesses,
            } => (protocol, type_witnesses, value_witnesses),
        };
        let id = self.protocol_id(protocol)?;
        let mut conformance = Conformance::new(id);
        let assoc_types = &self.table.protocol_decl(id).assoc_types;
        for (name, witness) in type_witnesses {
            let assoc = assoc_types
                .iter()
                .copied()
                .find(|assoc| assoc.name() == name.as_str())
                .ok_or_else(|| ScenarioError::unknown_assoc_type(protocol, name))?;
            let witness = self.resolve(witness, &Scope::default())?;
            conformance.type_witnesses.push((assoc, witness));
        }
        for (requirement, witness) in value_witnesses {
            conformance
                .value_witnesses
                .push((self.value_id(requirement)?, self.value_id(witness)?));
        }
        Ok(conformance)
    }

    fn resolve(&self, spec: &TypeSpec, scope: &Scope<'_, 'db>) -> ScenarioResult<Type<'db>> {
        let db = self.table.db();
        let ty = match spec {
            TypeSpec::Nominal(name) => Type::nominal(db, self.nominal_id(name)?),
            TypeSpec::Protocol(name) => Type::protocol(db, self.protocol_id(name)?),
            TypeSpec::Composition(names) => {
                let members = self
                    .protocol_ids(names)?
                    .into_iter()
                    .map(|proto| Type::protocol(db, proto))
                    .collect();
                Type::composition(db, members)
            }
            TypeSpec::Tuple(elts) => {
                let elts = elts
                    .iter()
                    .map(|elt| self.resolve_elt(elt, scope))
                    .collect::<ScenarioResult<Vec<_>>>()?;
                Type::tuple(db, elts)
            }
            TypeSpec::Function(function) => Type::function_ext(
                db,
                self.resolve(&function.input, scope)?,
                self.resolve(&function.result, scope)?,
                FunctionExt {
                    auto_closure: function.auto_closure,
                    no_return: function.no_return,
                },
            ),
            TypeSpec::Optional(object) => Type::optional(db, self.resolve(object, scope)?),
            TypeSpec::Array(element) => Type::array(db, self.resolve(element, scope)?),
            TypeSpec::Metatype(instance) => Type::metatype(db, self.resolve(instance, scope)?),
            TypeSpec::Lvalue(object) => {
                Type::lvalue(db, self.resolve(object, scope)?, LValueQuals::IMPLICIT)
            }
            TypeSpec::Inout(object) => {
                Type::lvalue(db, self.resolve(object, scope)?, LValueQuals::EXPLICIT)
            }
            TypeSpec::Var(name) => scope
                .vars
                .and_then(|vars| vars.get(name))
                .copied()
                .ok_or_else(|| ScenarioError::unknown_type_var(name))?,
            TypeSpec::Param(name) => Type::generic_param(db, scope.param(name)?.param),
            TypeSpec::Member { base, name } => {
                let param = scope.param(base)?;
                let assoc = param
                    .conforms_to
                    .iter()
                    .flat_map(|proto| self.table.protocol_decl(*proto).assoc_types.iter())
                    .copied()
                    .find(|assoc| assoc.name() == name.as_str())
                    .ok_or_else(|| ScenarioError::unknown_assoc_type(base, name))?;
                Type::dependent_member(db, Type::generic_param(db, param.param), assoc)
            }
        };
        Ok(ty)
    }

    fn resolve_elt(
        &self,
        spec: &TupleEltSpec,
        scope: &Scope<'_, 'db>,
    ) -> ScenarioResult<TupleElt<'db>> {
        let spec = match spec {
            TupleEltSpec::Plain(ty) => return Ok(TupleElt::new(self.resolve(ty, scope)?)),
            TupleEltSpec::Element(spec) => spec,
        };
        let ty = self.resolve(&spec.ty, scope)?;
        let mut elt = match &spec.name {
            Some(name) => TupleElt::named(Symbol::from_dynamic(name), ty),
            None => TupleElt::new(ty),
        };
        if spec.variadic {
            elt = elt.variadic();
        }
        if spec.default {
            elt = elt.with_default();
        }
        Ok(elt)
    }

    fn choices(
        &self,
        specs: &[ChoiceSpec],
        scope: &Scope<'_, 'db>,
    ) -> ScenarioResult<Vec<OverloadChoice<'db>>> {
        specs
            .iter()
            .map(|spec| match spec {
                ChoiceSpec::Value(key) => {
                    Ok(OverloadChoice::decl(&self.table, None, self.value_id(key)?))
                }
                ChoiceSpec::Member {
                    decl,
                    base,
                    dynamic,
                } => {
                    let decl = self.value_id(decl)?;
                    let base = self.resolve(base, scope)?;
                    Ok(if *dynamic {
                        OverloadChoice::DeclViaDynamic { base, decl }
                    } else {
                        OverloadChoice::decl(&self.table, Some(base), decl)
                    })
                }
            })
            .collect()
    }

    /// A nested constraint without an anchor of its own is attributed to
    /// the `enclosing` one.
    fn constraint(
        &self,
        spec: &ConstraintSpec,
        scope: &Scope<'_, 'db>,
        locators: &mut LocatorStore,
        enclosing: Option<LocatorId>,
    ) -> ScenarioResult<Constraint<'db>> {
        let locator = spec
            .anchor
            .map(|id| locators.anchor(Anchor::expr(id)))
            .or(enclosing);
        let relational = |kind, first: &TypeSpec, second: &TypeSpec| {
            Ok::<_, ScenarioError>(Constraint::relational(
                kind,
                self.resolve(first, scope)?,
                self.resolve(second, scope)?,
                locator,
            ))
        };
        let property = |property, ty: &TypeSpec| {
            Ok::<_, ScenarioError>(Constraint::type_property(
                property,
                self.resolve(ty, scope)?,
                locator,
            ))
        };

        let constraint = match &spec.kind {
            ConstraintKindSpec::Bind { first, second } => {
                relational(MatchKind::Bind, first, second)?
            }
            ConstraintKindSpec::Equal { first, second } => {
                relational(MatchKind::SameType, first, second)?
            }
            ConstraintKindSpec::TrivialSubtype { first, second } => {
                relational(MatchKind::TrivialSubtype, first, second)?
            }
            ConstraintKindSpec::Subtype { first, second } => {
                relational(MatchKind::Subtype, first, second)?
            }
            ConstraintKindSpec::Conversion { first, second } => {
                relational(MatchKind::Conversion, first, second)?
            }
            ConstraintKindSpec::Construction { argument, value } => Constraint::construction(
                self.resolve(argument, scope)?,
                self.resolve(value, scope)?,
                locator,
            ),
            ConstraintKindSpec::ApplicableFunction { function, callee } => {
                Constraint::applicable_function(
                    self.resolve(function, scope)?,
                    self.resolve(callee, scope)?,
                    locator,
                )
            }
            ConstraintKindSpec::ConformsTo { ty, protocol } => Constraint::conforms_to(
                self.resolve(ty, scope)?,
                self.protocol_id(protocol)?,
                locator,
            ),
            ConstraintKindSpec::SelfObjectOf { ty, protocol } => Constraint::self_object_of(
                self.resolve(ty, scope)?,
                self.protocol_id(protocol)?,
                locator,
            ),
            ConstraintKindSpec::CheckedCast { from, to } => Constraint::checked_cast(
                self.resolve(from, scope)?,
                self.resolve(to, scope)?,
                locator,
            ),
            ConstraintKindSpec::ValueMember { base, name, member } => Constraint::value_member(
                self.resolve(base, scope)?,
                Symbol::from_dynamic(name),
                self.resolve(member, scope)?,
                locator,
            ),
            ConstraintKindSpec::TypeMember { base, name, member } => Constraint::type_member(
                self.resolve(base, scope)?,
                Symbol::from_dynamic(name),
                self.resolve(member, scope)?,
                locator,
            ),
            ConstraintKindSpec::Archetype { ty } => property(TypeProperty::Archetype, ty)?,
            ConstraintKindSpec::Class { ty } => property(TypeProperty::Class, ty)?,
            ConstraintKindSpec::DynamicLookupValue { ty } => {
                property(TypeProperty::DynamicLookupValue, ty)?
            }
            ConstraintKindSpec::Overload { bound, choices } => {
                let bound = self.resolve(bound, scope)?;
                let mut alternatives: Vec<_> = self
                    .choices(choices, scope)?
                    .into_iter()
                    .map(|choice| Constraint::bind_overload(bound, choice, locator))
                    .collect();
                match alternatives.len() {
                    1 => alternatives.remove(0),
                    _ => Constraint::disjunction(alternatives, locator),
                }
            }
            ConstraintKindSpec::Conjunction { constraints } => {
                let nested = constraints
                    .iter()
                    .map(|nested| self.constraint(nested, scope, locators, locator))
                    .collect::<ScenarioResult<Vec<_>>>()?;
                Constraint::conjunction(nested, locator)
            }
            ConstraintKindSpec::Disjunction { constraints } => {
                let nested = constraints
                    .iter()
                    .map(|nested| self.constraint(nested, scope, locators, locator))
                    .collect::<ScenarioResult<Vec<_>>>()?;
                Constraint::disjunction(nested, locator)
            }
        };
        Ok(constraint)
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use tessera_solver::SolverContext;

    use super::*;
    use crate::error::ScenarioErrorKind;

    fn test_db() -> salsa::DatabaseImpl {
        salsa::DatabaseImpl::new()
    }

    const SEQUENCES: &str = r#"{
        "protocols": [
            { "name": "Sequence", "associated_types": [{ "name": "Element" }] }
        ],
        "types": [
            { "name": "Int" },
            { "name": "IntList", "conforms_to": [
                { "protocol": "Sequence", "type_witnesses": { "Element": { "nominal": "Int" } } }
            ] }
        ],
        "values": [
            { "name": "first", "generic_params": [{ "name": "S", "conforms_to": ["Sequence"] }],
              "type": { "function": {
                  "input": { "param": "S" },
                  "result": { "optional": { "member": { "base": "S", "name": "Element" } } } } } }
        ]
    }"#;

    #[test]
    fn generic_value_gets_generic_function_type() {
        let db = test_db();
        let scenario = Scenario::from_json(SEQUENCES).unwrap();
        let decls = scenario.build_decls(&db).unwrap();
        let first = decls.value("first").unwrap();
        let ty = decls.table.value_decl(first).interface_type;
        assert!(ty.is_generic_function(&db));
        assert_snapshot!(ty.display(&db), @"<S where S: Sequence> S -> S.Element?");
    }

    #[test]
    fn type_witnesses_are_recorded() {
        let db = test_db();
        let scenario = Scenario::from_json(SEQUENCES).unwrap();
        let decls = scenario.build_decls(&db).unwrap();
        let list = decls.nominal("IntList").unwrap();
        let conformance = &decls.table.nominal_decl(list).conformances[0];
        assert_eq!(conformance.type_witnesses.len(), 1);
        assert_snapshot!(conformance.type_witnesses[0].1.display(&db), @"Int");
    }

    #[test]
    fn type_vars_follow_declaration_order() {
        let db = test_db();
        let scenario = Scenario::from_json(
            r#"{
                "types": [{ "name": "Int" }],
                "type_vars": ["a", { "name": "b", "lvalue": true, "anchor": 3 }],
                "constraints": [
                    { "kind": "bind", "first": { "var": "a" }, "second": { "nominal": "Int" } },
                    { "kind": "conversion", "first": { "var": "b" }, "second": { "var": "a" }, "anchor": 4 }
                ]
            }"#,
        )
        .unwrap();
        let decls = scenario.build_decls(&db).unwrap();
        let mut cs = ConstraintSystem::new(
            SolverContext::new(&db, &decls.table),
            scenario.config.clone(),
        );
        let vars = scenario.populate(&mut cs, &decls).unwrap();
        let names: Vec<_> = vars.iter().map(|(var, name)| format!("{var}={name}")).collect();
        assert_eq!(names, ["$T0=a", "$T1=b"]);
        assert!(cs.type_vars().options(TypeVarId(1)).can_bind_to_lvalue);
        assert_snapshot!(cs.dump(), @r"
        Type Variables:
          $T0 as Int
          $T1 [lvalue allowed]
        Active Constraints:
          $T1 <c $T0 [[expr#4]]
        ");
    }

    #[test]
    fn unknown_names_are_reported() {
        let db = test_db();
        let scenario = Scenario::from_json(
            r#"{ "values": [{ "name": "f", "type": { "nominal": "Missing" } }] }"#,
        )
        .unwrap();
        let Err(err) = scenario.build_decls(&db) else {
            panic!("expected an error");
        };
        assert!(matches!(err.kind(), ScenarioErrorKind::UnknownType(name) if name == "Missing"));
        assert_snapshot!(err, @"Unknown type: Missing");
    }

    #[test]
    fn duplicate_value_keys_are_rejected() {
        let db = test_db();
        let scenario = Scenario::from_json(
            r#"{
                "types": [{ "name": "Int" }],
                "values": [
                    { "name": "f", "type": { "nominal": "Int" } },
                    { "name": "f", "type": { "nominal": "Int" } }
                ]
            }"#,
        )
        .unwrap();
        let Err(err) = scenario.build_decls(&db) else {
            panic!("expected an error");
        };
        assert_snapshot!(err, @"Duplicate value: f");
    }

    #[test]
    fn generic_values_must_be_functions() {
        let db = test_db();
        let scenario = Scenario::from_json(
            r#"{ "values": [{ "name": "x", "generic_params": [{ "name": "T" }], "type": { "param": "T" } }] }"#,
        )
        .unwrap();
        let Err(err) = scenario.build_decls(&db) else {
            panic!("expected an error");
        };
        assert_snapshot!(err, @"Generic value x must have a function type");
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        let err = Scenario::from_json(r#"{ "types": 3 }"#).unwrap_err();
        assert!(matches!(err.kind(), ScenarioErrorKind::Json(_)));
    }
}
