use super::{push_dyn, read_coded, write_coded, TableRow};
use crate::{
    metadata::tables::{ResolutionScope, TableId, TableInfo, TypeDefOrRef, TypeOrMethodDef},
    Result,
};

table_row! {
    /// `Module` (0x00): the single row describing this module.
    ModuleRaw(Module) {
        /// Reserved, 0
        generation: u16,
        /// `#Strings` index of the module name
        name: str,
        /// `#GUID` index of the module version id
        mvid: guid,
        /// Reserved, 0
        enc_id: guid,
        /// Reserved, 0
        enc_base_id: guid,
    }
}

table_row! {
    /// `TypeRef` (0x01): a type defined elsewhere.
    TypeRefRaw(TypeRef) {
        /// Where the type is defined: module, module reference, assembly reference or the
        /// enclosing type reference
        resolution_scope: coded(ResolutionScope),
        /// `#Strings` index of the type name
        name: str,
        /// `#Strings` index of the namespace
        namespace: str,
    }
}

table_row! {
    /// `TypeDef` (0x02): a type defined in this module.
    ///
    /// The type owns the fields from `field_list` up to the next row's `field_list`, and the
    /// methods from `method_list` up to the next row's `method_list`.
    TypeDefRaw(TypeDef) {
        /// `TypeAttributes`
        flags: u32,
        /// `#Strings` index of the type name
        name: str,
        /// `#Strings` index of the namespace
        namespace: str,
        /// Base type, `None` for interfaces and `System.Object`
        extends: coded(TypeDefOrRef),
        /// First owned field
        field_list: index(Field),
        /// First owned method
        method_list: index(MethodDef),
    }
}

table_row! {
    /// `InterfaceImpl` (0x09)
    InterfaceImplRaw(InterfaceImpl) {
        /// Implementing type
        class: index(TypeDef),
        /// Implemented interface
        interface: coded(TypeDefOrRef),
    }
}

table_row! {
    /// `ClassLayout` (0x0F): explicit packing and size of a type.
    ClassLayoutRaw(ClassLayout) {
        /// Field alignment
        packing_size: u16,
        /// Total size in bytes
        class_size: u32,
        /// The type being laid out
        parent: index(TypeDef),
    }
}

table_row! {
    /// `TypeSpec` (0x1B): a constructed type given by signature.
    TypeSpecRaw(TypeSpec) {
        /// `#Blob` index of the type signature
        signature: blob,
    }
}

table_row! {
    /// `NestedClass` (0x29)
    NestedClassRaw(NestedClass) {
        /// The nested type
        nested_class: index(TypeDef),
        /// Its enclosing type
        enclosing_class: index(TypeDef),
    }
}

table_row! {
    /// `GenericParam` (0x2A): a generic parameter of a type or method.
    GenericParamRaw(GenericParam) {
        /// 0-based position in the owner's parameter list
        number: u16,
        /// `GenericParamAttributes`
        flags: u16,
        /// Owning type or method
        owner: coded(TypeOrMethodDef),
        /// `#Strings` index of the name
        name: str,
    }
}

table_row! {
    /// `GenericParamConstraint` (0x2C)
    GenericParamConstraintRaw(GenericParamConstraint) {
        /// The constrained parameter
        owner: index(GenericParam),
        /// The constraint type
        constraint: coded(TypeDefOrRef),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typedef_crafted() {
        #[rustfmt::skip]
        let data = [
            0x01, 0x00, 0x10, 0x00,
            0x22, 0x00,
            0x33, 0x00,
            0x05, 0x00,
            0x01, 0x00,
            0x02, 0x00,
        ];

        let info = TableInfo::new([0; 64], 0);
        assert_eq!(TypeDefRaw::row_size(&info), 14);

        let mut offset = 0;
        let row = TypeDefRaw::read_row(&data, &mut offset, 7, &info).unwrap();
        assert_eq!(offset, 14);
        assert_eq!(row.rid, 7);
        assert_eq!(row.flags, 0x0010_0001);
        assert_eq!(row.name, 0x22);
        assert_eq!(row.namespace, 0x33);
        assert_eq!(row.extends, Some(TypeDefOrRef::TypeRef(1)));
        assert_eq!(row.field_list, 1);
        assert_eq!(row.method_list, 2);
        assert_eq!(row.token().value(), 0x0200_0007);

        let mut out = Vec::new();
        row.write_row(&mut out, &info).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn typeref_wide_columns() {
        #[rustfmt::skip]
        let data = [
            0x06, 0x00, 0x00, 0x00,
            0x10, 0x00, 0x00, 0x00,
            0x20, 0x00, 0x00, 0x00,
        ];

        let mut rows = [0u32; 64];
        rows[TableId::AssemblyRef as usize] = 0x4000;
        let info = TableInfo::new(rows, 0x01);
        assert_eq!(TypeRefRaw::row_size(&info), 12);

        let mut offset = 0;
        let row = TypeRefRaw::read_row(&data, &mut offset, 1, &info).unwrap();
        assert_eq!(row.resolution_scope, Some(ResolutionScope::AssemblyRef(1)));
        assert_eq!(row.name, 0x10);
        assert_eq!(row.namespace, 0x20);
    }

    #[test]
    fn narrow_overflow() {
        let row = TypeSpecRaw {
            rid: 1,
            signature: 0x1_0000,
        };
        let info = TableInfo::new([0; 64], 0);
        assert!(row.write_row(&mut Vec::new(), &info).is_err());
        assert!(row.write_row(&mut Vec::new(), &TableInfo::new([0; 64], 0x04)).is_ok());
    }
}
