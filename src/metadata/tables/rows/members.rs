use super::{push_dyn, read_coded, write_coded, TableRow};
use crate::{
    metadata::tables::{
        CustomAttributeType, HasConstant, HasCustomAttribute, HasDeclSecurity, HasFieldMarshal,
        HasSemantics, MemberForwarded, MemberRefParent, MethodDefOrRef, TableId, TableInfo,
        TypeDefOrRef,
    },
    Result,
};

table_row! {
    /// `Field` (0x04)
    FieldRaw(Field) {
        /// `FieldAttributes`
        flags: u16,
        /// `#Strings` index of the name
        name: str,
        /// `#Blob` index of the field signature
        signature: blob,
    }
}

table_row! {
    /// `MethodDef` (0x06)
    ///
    /// The method owns the parameters from `param_list` up to the next row's `param_list`.
    MethodDefRaw(MethodDef) {
        /// RVA of the method body, 0 for abstract and runtime methods
        rva: u32,
        /// `MethodImplAttributes`
        impl_flags: u16,
        /// `MethodAttributes`
        flags: u16,
        /// `#Strings` index of the name
        name: str,
        /// `#Blob` index of the method signature
        signature: blob,
        /// First owned parameter
        param_list: index(Param),
    }
}

table_row! {
    /// `Param` (0x08)
    ParamRaw(Param) {
        /// `ParamAttributes`
        flags: u16,
        /// 0 for the return value, 1.. for parameters
        sequence: u16,
        /// `#Strings` index of the name
        name: str,
    }
}

table_row! {
    /// `MemberRef` (0x0A): a field or method referenced by name and signature.
    MemberRefRaw(MemberRef) {
        /// Owning type, module or vararg method definition
        class: coded(MemberRefParent),
        /// `#Strings` index of the name
        name: str,
        /// `#Blob` index of the field or method signature
        signature: blob,
    }
}

table_row! {
    /// `Constant` (0x0B): a compile-time value of a field, parameter or property.
    ConstantRaw(Constant) {
        /// Element type of the value
        element_type: u8,
        /// Padding, 0
        padding: u8,
        /// Owner of the value
        parent: coded(HasConstant),
        /// `#Blob` index of the value
        value: blob,
    }
}

table_row! {
    /// `CustomAttribute` (0x0C)
    CustomAttributeRaw(CustomAttribute) {
        /// Any row the attribute is attached to
        parent: coded(HasCustomAttribute),
        /// The attribute constructor
        constructor: coded(CustomAttributeType),
        /// `#Blob` index of the encoded arguments
        value: blob,
    }
}

table_row! {
    /// `FieldMarshal` (0x0D)
    FieldMarshalRaw(FieldMarshal) {
        /// Marshalled field or parameter
        parent: coded(HasFieldMarshal),
        /// `#Blob` index of the native type descriptor
        native_type: blob,
    }
}

table_row! {
    /// `DeclSecurity` (0x0E)
    DeclSecurityRaw(DeclSecurity) {
        /// Security action
        action: u16,
        /// Protected type, method or assembly
        parent: coded(HasDeclSecurity),
        /// `#Blob` index of the permission set
        permission_set: blob,
    }
}

table_row! {
    /// `FieldLayout` (0x10)
    FieldLayoutRaw(FieldLayout) {
        /// Byte offset within the instance
        field_offset: u32,
        /// The positioned field
        field: index(Field),
    }
}

table_row! {
    /// `StandAloneSig` (0x11): local variable and indirect call signatures.
    StandAloneSigRaw(StandAloneSig) {
        /// `#Blob` index of the signature
        signature: blob,
    }
}

table_row! {
    /// `EventMap` (0x12)
    EventMapRaw(EventMap) {
        /// Owning type
        parent: index(TypeDef),
        /// First owned event
        event_list: index(Event),
    }
}

table_row! {
    /// `Event` (0x14)
    EventRaw(Event) {
        /// `EventAttributes`
        flags: u16,
        /// `#Strings` index of the name
        name: str,
        /// Delegate type of the event
        event_type: coded(TypeDefOrRef),
    }
}

table_row! {
    /// `PropertyMap` (0x15)
    PropertyMapRaw(PropertyMap) {
        /// Owning type
        parent: index(TypeDef),
        /// First owned property
        property_list: index(Property),
    }
}

table_row! {
    /// `Property` (0x17)
    PropertyRaw(Property) {
        /// `PropertyAttributes`
        flags: u16,
        /// `#Strings` index of the name
        name: str,
        /// `#Blob` index of the property signature
        signature: blob,
    }
}

table_row! {
    /// `MethodSemantics` (0x18): accessor methods of events and properties.
    MethodSemanticsRaw(MethodSemantics) {
        /// `MethodSemanticsAttributes`
        semantics: u16,
        /// The accessor
        method: index(MethodDef),
        /// Event or property
        association: coded(HasSemantics),
    }
}

table_row! {
    /// `MethodImpl` (0x19): explicit overrides.
    MethodImplRaw(MethodImpl) {
        /// Type declaring the override
        class: index(TypeDef),
        /// The implementing method
        method_body: coded(MethodDefOrRef),
        /// The overridden method
        method_declaration: coded(MethodDefOrRef),
    }
}

table_row! {
    /// `ModuleRef` (0x1A)
    ModuleRefRaw(ModuleRef) {
        /// `#Strings` index of the module name
        name: str,
    }
}

table_row! {
    /// `ImplMap` (0x1C): platform invoke targets.
    ImplMapRaw(ImplMap) {
        /// `PInvokeAttributes`
        mapping_flags: u16,
        /// The forwarded field or method
        member_forwarded: coded(MemberForwarded),
        /// `#Strings` index of the native entry point
        import_name: str,
        /// Native module
        import_scope: index(ModuleRef),
    }
}

table_row! {
    /// `FieldRVA` (0x1D): initial data of a static field.
    FieldRVARaw(FieldRVA) {
        /// RVA of the data
        rva: u32,
        /// The initialised field
        field: index(Field),
    }
}

table_row! {
    /// `MethodSpec` (0x2B): a generic method instantiation.
    MethodSpecRaw(MethodSpec) {
        /// The generic method
        method: coded(MethodDefOrRef),
        /// `#Blob` index of the instantiation signature
        instantiation: blob,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn methoddef_crafted() {
        #[rustfmt::skip]
        let data = [
            0x50, 0x20, 0x00, 0x00,
            0x00, 0x00,
            0x86, 0x18,
            0x10, 0x00,
            0x0A, 0x00,
            0x01, 0x00,
        ];

        let info = TableInfo::new([0; 64], 0);
        assert_eq!(MethodDefRaw::row_size(&info), 14);

        let mut offset = 0;
        let row = MethodDefRaw::read_row(&data, &mut offset, 1, &info).unwrap();
        assert_eq!(row.rva, 0x2050);
        assert_eq!(row.flags, 0x1886);
        assert_eq!(row.name, 0x10);
        assert_eq!(row.signature, 0x0A);
        assert_eq!(row.param_list, 1);
    }

    #[test]
    fn custom_attribute_crafted() {
        #[rustfmt::skip]
        let data = [
            0x21, 0x00,
            0x1B, 0x00,
            0x40, 0x00,
        ];

        let info = TableInfo::new([0; 64], 0);
        let mut offset = 0;
        let row = CustomAttributeRaw::read_row(&data, &mut offset, 1, &info).unwrap();
        assert_eq!(row.parent, Some(HasCustomAttribute::Field(1)));
        assert_eq!(row.constructor, Some(CustomAttributeType::MemberRef(3)));
        assert_eq!(row.value, 0x40);

        let mut out = Vec::new();
        row.write_row(&mut out, &info).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn constant_crafted() {
        let data = [0x08, 0x00, 0x04, 0x00, 0x05, 0x00];
        let info = TableInfo::new([0; 64], 0);
        assert_eq!(ConstantRaw::row_size(&info), 6);

        let mut offset = 0;
        let row = ConstantRaw::read_row(&data, &mut offset, 1, &info).unwrap();
        assert_eq!(row.element_type, 0x08);
        assert_eq!(row.parent, Some(HasConstant::Field(1)));
    }
}
