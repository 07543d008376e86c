use std::collections::HashMap;

use crate::{
    metadata::{
        signatures::{ClassRef, ElementType, TypeName, TypeResolver, TypeSig},
        tables::TableId,
        token::Token,
        typesystem::ModuleId,
    },
    Error, Result,
};

/// In-memory resolver over a handful of named definitions.
#[derive(Debug, Default)]
pub(crate) struct TestResolver {
    modules: Vec<String>,
    defs: Vec<(ClassRef, TypeName)>,
    aliases: HashMap<ClassRef, ClassRef>,
    primitives: HashMap<ClassRef, ElementType>,
}

impl TestResolver {
    pub(crate) fn define(&mut self, module: &str, namespace: &str, name: &str) -> ClassRef {
        let id = match self.modules.iter().position(|m| m == module) {
            Some(index) => index,
            None => {
                self.modules.push(module.to_string());
                self.modules.len() - 1
            }
        };
        let module_id = ModuleId(id as u32);
        let row = self.defs.iter().filter(|(c, _)| c.module == module_id).count() as u32 + 1;

        let class = ClassRef::new(module_id, Token::from_parts(TableId::TypeDef, row));
        self.defs
            .push((class, TypeName::new(module, namespace, name)));
        class
    }

    pub(crate) fn alias(&mut self, reference: ClassRef, definition: ClassRef) {
        self.aliases.insert(reference, definition);
    }

    pub(crate) fn map_primitive(&mut self, class: ClassRef, kind: ElementType) {
        self.primitives.insert(class, kind);
    }

    fn definition(&self, class: ClassRef) -> ClassRef {
        self.aliases.get(&class).copied().unwrap_or(class)
    }
}

impl TypeResolver for TestResolver {
    fn resolve_class(&self, class: ClassRef) -> Result<TypeSig> {
        let class = self.definition(class);
        Ok(match self.primitives.get(&class) {
            Some(kind) => TypeSig::Primitive(*kind),
            None => TypeSig::Class(class),
        })
    }

    fn type_name(&self, class: ClassRef) -> Result<TypeName> {
        let class = self.definition(class);
        self.defs
            .iter()
            .find(|(c, _)| *c == class)
            .map(|(_, name)| name.clone())
            .ok_or_else(|| Error::TypeNotFound(class.token.to_string()))
    }

    fn find_type(&self, name: &TypeName) -> Result<ClassRef> {
        if !self.modules.contains(&name.module) {
            return Err(Error::AssemblyNotFound(name.module.clone()));
        }

        self.defs
            .iter()
            .find(|(_, n)| n == name)
            .map(|(c, _)| *c)
            .ok_or_else(|| Error::TypeNotFound(name.to_string()))
    }
}
