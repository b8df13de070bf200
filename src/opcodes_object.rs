//! Object tree handlers: hierarchy links, attributes, properties, and the
//! object-name print

use crate::error::ZResult;
use crate::executor::{arg, Machine, Outcome};

impl Machine {
    /// get_sibling / get_child: store the link and branch when it exists.
    pub(crate) fn op_relation(&mut self, ops: &[u16], which: u32) -> ZResult<Outcome> {
        let obj = arg(self, ops, 0)?;
        let link = if which == 1 {
            self.objects.sibling(&self.mem, obj)?
        } else {
            self.objects.child(&self.mem, obj)?
        };
        Ok(Outcome::ValueCond(link, link != 0))
    }

    pub(crate) fn op_get_parent(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let obj = arg(self, ops, 0)?;
        Ok(Outcome::Value(self.objects.parent(&self.mem, obj)?))
    }

    /// jin: branch if the object sits directly inside the second.
    pub(crate) fn op_jin(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let obj = arg(self, ops, 0)?;
        let container = arg(self, ops, 1)?;
        Ok(Outcome::Cond(self.objects.parent(&self.mem, obj)? == container))
    }

    pub(crate) fn op_test_attr(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let obj = arg(self, ops, 0)?;
        let attr = arg(self, ops, 1)?;
        Ok(Outcome::Cond(self.objects.get_attr(&self.mem, obj, attr)?))
    }

    pub(crate) fn op_write_attr(&mut self, ops: &[u16], set: bool) -> ZResult<Outcome> {
        let obj = arg(self, ops, 0)?;
        let attr = arg(self, ops, 1)?;
        if set {
            self.objects.set_attr(&mut self.mem, obj, attr)?;
        } else {
            self.objects.clear_attr(&mut self.mem, obj, attr)?;
        }
        Ok(Outcome::Done)
    }

    pub(crate) fn op_insert_obj(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let obj = arg(self, ops, 0)?;
        let dest = arg(self, ops, 1)?;
        self.objects.insert_obj(&mut self.mem, obj, dest)?;
        Ok(Outcome::Done)
    }

    pub(crate) fn op_remove_obj(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let obj = arg(self, ops, 0)?;
        self.objects.remove_obj(&mut self.mem, obj)?;
        Ok(Outcome::Done)
    }

    pub(crate) fn op_get_prop(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let obj = arg(self, ops, 0)?;
        let prop = arg(self, ops, 1)? as u8;
        Ok(Outcome::Value(self.objects.get_prop(&self.mem, obj, prop)?))
    }

    pub(crate) fn op_put_prop(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let obj = arg(self, ops, 0)?;
        let prop = arg(self, ops, 1)? as u8;
        let value = arg(self, ops, 2)?;
        self.objects.put_prop(&mut self.mem, obj, prop, value)?;
        Ok(Outcome::Done)
    }

    pub(crate) fn op_get_prop_addr(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let obj = arg(self, ops, 0)?;
        let prop = arg(self, ops, 1)? as u8;
        Ok(Outcome::Value(
            self.objects.get_prop_addr(&self.mem, obj, prop)?,
        ))
    }

    pub(crate) fn op_get_prop_len(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let addr = arg(self, ops, 0)?;
        Ok(Outcome::Value(self.objects.get_prop_len(&self.mem, addr)?))
    }

    pub(crate) fn op_get_next_prop(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let obj = arg(self, ops, 0)?;
        let prop = arg(self, ops, 1)? as u8;
        Ok(Outcome::Value(
            self.objects.get_next_prop(&self.mem, obj, prop)? as u16,
        ))
    }

    pub(crate) fn op_print_obj(&mut self, ops: &[u16]) -> ZResult<Outcome> {
        let obj = arg(self, ops, 0)?;
        let name = self.objects.name(&self.mem, &self.codec, obj)?;
        self.print_str(&name)?;
        Ok(Outcome::Done)
    }
}
